//! The naming stage as a whole: filter, number, merge, sort and resolve.

use serde::Serialize;
use si_core::{LookupTable, ManualNames, RunContext, ScanRecord, SeriesName, sort_records};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::error::NamingError;
use crate::filter::apply_filter;
use crate::merge::merge_name;
use crate::numbering::number_records;
use crate::patterns::patterns;
use crate::resolver::resolve_names;

/// Counts from one naming run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NamingReport {
    /// Records with a final name.
    pub named: usize,
    /// Records excluded by the filter.
    pub filtered: usize,
    /// Records excluded by an override, the classifier or the resolver.
    pub excluded: usize,
}

fn reset(record: &mut ScanRecord) {
    record.manual_name = None;
    record.lookup_name = None;
    record.predicted_name = None;
    record.final_name = None;
    record.exclusion = None;
}

/// Names every record of a session.
///
/// Previous naming results are discarded first, so the same records can be
/// renamed after an override changes. On return the records are sorted
/// convertible-first and every convertible record has a unique final name
/// starting with `prefix`.
///
/// # Errors
///
/// Returns [`NamingError::Pattern`] if the built-in patterns fail to
/// compile. Per-record problems exclude the record instead.
pub fn name_records(
    records: &mut [ScanRecord],
    prefix: &str,
    lookup: &LookupTable,
    manual: &ManualNames,
    ctx: &RunContext,
) -> Result<NamingReport, NamingError> {
    let config = &ctx.config().naming;
    let classifier = Classifier::new(config)?;

    records.iter_mut().for_each(reset);
    let numbers = number_records(records, config);
    let filtered = apply_filter(records, patterns()?);

    for (record, numbers) in records.iter_mut().zip(numbers) {
        if !record.convert_image() {
            continue;
        }
        match merge_name(record, &classifier, lookup, manual) {
            Ok(fields) => {
                record.final_name = Some(SeriesName::new(
                    prefix,
                    numbers.study,
                    numbers.series,
                    fields,
                ));
            }
            Err(reason) => {
                if reason.is_failure() {
                    warn!(series = %record.series_uid, %reason, "classification failed");
                }
                record.exclude(reason);
            }
        }
    }

    sort_records(records);
    resolve_names(records, config);

    let named = records.iter().filter(|r| r.final_name.is_some()).count();
    let excluded = records.len() - named - filtered;
    for _ in 0..named {
        ctx.stats().record_named();
    }
    for _ in 0..records.len() - named {
        ctx.stats().record_excluded();
    }
    info!(named, filtered, excluded, "naming complete");
    Ok(NamingReport {
        named,
        filtered,
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use si_core::{ApproxVector, Config, ExclusionReason, NameOverride};

    fn record(uid: &str, number: i64, desc: &str) -> ScanRecord {
        ScanRecord {
            series_number: Some(number),
            series_description: desc.to_owned(),
            sequence_type: vec!["SE".to_owned()],
            image_type: vec!["ORIGINAL".to_owned(), "PRIMARY".to_owned()],
            orientation: Some(ApproxVector::from([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
            flip_angle: Some(90.0),
            echo_time: Some(90.0),
            repetition_time: Some(4000.0),
            slice_thickness: Some(5.0),
            num_files: 30,
            ..ScanRecord::new(uid, "1.2", format!("dcm/{uid}"))
        }
    }

    #[test]
    fn test_name_session() {
        let mut records = vec![
            record("1.2.3.01", 3, "AX T2"),
            record("1.2.1.01", 1, "3-plane loc"),
            record("1.2.2.01", 2, "AX T1 FLAIR"),
            record("1.2.4.01", 4, "AX PD"),
        ];
        let mut lookup = LookupTable::default();
        lookup.insert("NONE", "AX PD", NameOverride::Suppress);
        let ctx = RunContext::new(Config::default());

        let report = name_records(
            &mut records,
            "P-0001_01",
            &lookup,
            &ManualNames::default(),
            &ctx,
        )
        .unwrap();
        assert_eq!(
            report,
            NamingReport {
                named: 2,
                filtered: 1,
                excluded: 1
            }
        );

        let names: Vec<Option<String>> =
            records.iter().map(ScanRecord::final_name_string).collect();
        assert_eq!(
            names,
            vec![
                Some("P-0001_01_01-02_BRAIN-T1-IRSE-2D-AXIAL-PRE".to_owned()),
                Some("P-0001_01_01-03_BRAIN-T2-SE-2D-AXIAL-PRE".to_owned()),
                None,
                None,
            ]
        );
        assert!(matches!(
            records[3].exclusion,
            Some(ExclusionReason::Suppressed { .. })
        ));
        let stats = ctx.stats().snapshot();
        assert_eq!(stats.records_named, 2);
        assert_eq!(stats.records_excluded, 2);
    }

    #[test]
    fn test_rename_after_override() {
        let mut records = vec![record("1.2.3.01", 3, "AX T2")];
        let ctx = RunContext::new(Config::default());
        let mut lookup = LookupTable::default();
        lookup.insert("NONE", "AX T2", NameOverride::Suppress);
        name_records(&mut records, "P", &lookup, &ManualNames::default(), &ctx).unwrap();
        assert!(!records[0].convert_image());

        let report = name_records(
            &mut records,
            "P",
            &LookupTable::default(),
            &ManualNames::default(),
            &ctx,
        )
        .unwrap();
        assert_eq!(report.named, 1);
        assert!(records[0].convert_image());
    }
}
