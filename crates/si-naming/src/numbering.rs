//! Study and series numbering within a session.
//!
//! Records are ordered by acquisition time and split into blocks wherever
//! the scanner changes or the acquisitions are far apart in time. A study is
//! a distinct `(block, study uid)` pair; a series is a distinct
//! `(series number, description)` pair within its study. Both are numbered
//! from 1 in order of appearance.

use std::cmp::Ordering;

use si_core::{FxHashMap, NamingConfig, ScanRecord, fx_hash_map};

/// Study and series number of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesNumbers {
    /// 1-based study number.
    pub study: u32,
    /// 1-based series number within the study.
    pub series: u32,
}

fn opt_f64_cmp(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn acquisition_cmp(a: &ScanRecord, b: &ScanRecord) -> Ordering {
    a.acq_datetime
        .cmp(&b.acq_datetime)
        .then_with(|| a.series_number.cmp(&b.series_number))
        .then_with(|| a.institution.cmp(&b.institution))
        .then_with(|| opt_f64_cmp(a.field_strength, b.field_strength))
        .then_with(|| a.scanner_model.cmp(&b.scanner_model))
}

/// Returns `true` if `current` starts a new block after `previous`.
fn is_break(previous: &ScanRecord, current: &ScanRecord, gap_secs: i64) -> bool {
    let (Some(prev_inst), Some(prev_field), Some(prev_model)) = (
        previous.institution.as_deref(),
        previous.field_strength,
        previous.scanner_model.as_deref(),
    ) else {
        return false;
    };
    let (Some(inst), Some(field), Some(model)) = (
        current.institution.as_deref(),
        current.field_strength,
        current.scanner_model.as_deref(),
    ) else {
        return false;
    };
    if inst != prev_inst || field.total_cmp(&prev_field).is_ne() || model != prev_model {
        return true;
    }
    match (previous.acq_datetime, current.acq_datetime) {
        (Some(prev), Some(cur)) => (cur - prev).num_seconds() > gap_secs,
        _ => false,
    }
}

fn position_of<T: PartialEq>(items: &mut Vec<T>, item: T) -> u32 {
    let index = items.iter().position(|existing| *existing == item).unwrap_or_else(|| {
        items.push(item);
        items.len() - 1
    });
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Assigns study and series numbers, returned in the input order.
#[must_use]
pub fn number_records(records: &[ScanRecord], config: &NamingConfig) -> Vec<SeriesNumbers> {
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| acquisition_cmp(&records[a], &records[b]));

    let mut block = 0_usize;
    let mut studies: Vec<(usize, &str)> = Vec::new();
    let mut series_by_study: FxHashMap<u32, Vec<(Option<i64>, &str)>> = fx_hash_map();
    let mut numbers = vec![SeriesNumbers { study: 0, series: 0 }; records.len()];

    for (pos, &index) in order.iter().enumerate() {
        let record = &records[index];
        if pos > 0 && is_break(&records[order[pos - 1]], record, config.study_gap_secs) {
            block += 1;
        }
        let study = position_of(&mut studies, (block, record.study_uid.as_str()));
        let series = position_of(
            series_by_study.entry(study).or_default(),
            (record.series_number, record.series_description.as_str()),
        );
        numbers[index] = SeriesNumbers { study, series };
    }
    numbers
}
