//! Removal of identifying attributes from named records.
//!
//! Anonymization runs after naming, so lookup matching still sees the real
//! institution. Study identifiers become fresh UUID-derived UIDs
//! (`2.25.<decimal>`), series identifiers are renumbered under them,
//! institution and device identifiers are replaced by their SHA-256, and
//! acquisition times are moved by a fixed number of days.

use chrono::{NaiveDateTime, TimeDelta};
use si_core::digest::hash_bytes;
use si_core::{FxHashMap, LookupTable, ScanRecord, fx_hash_map};
use tracing::{info, warn};
use uuid::Uuid;

/// Options for anonymizing a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anonymization {
    /// Days added to every acquisition time; may be negative.
    pub date_shift_days: i64,
}

fn random_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Moves `datetime` by `days`, or returns `None` if the result is out of
/// range.
#[must_use]
pub fn shift_datetime(datetime: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    TimeDelta::try_days(days).and_then(|delta| datetime.checked_add_signed(delta))
}

impl Anonymization {
    /// Anonymizes `records` and the institutions of `lookup` in place.
    ///
    /// Records keep their order; series are numbered `.001`, `.002`, ...
    /// within each replacement study in that order.
    pub fn apply(&self, records: &mut [ScanRecord], lookup: &mut LookupTable) {
        let mut studies: FxHashMap<String, (String, u32)> = fx_hash_map();
        for record in records.iter_mut() {
            let (study_uid, count) = studies
                .entry(std::mem::take(&mut record.study_uid))
                .or_insert_with(|| (random_uid(), 0));
            *count += 1;
            record.series_uid = format!("{study_uid}.{count:03}");
            record.study_uid.clone_from(study_uid);

            record.institution = record.institution.as_deref().map(|v| hash_bytes(v.as_bytes()));
            record.device_id = record.device_id.as_deref().map(|v| hash_bytes(v.as_bytes()));
            if let Some(datetime) = record.acq_datetime {
                record.acq_datetime = shift_datetime(datetime, self.date_shift_days);
                if record.acq_datetime.is_none() {
                    warn!(
                        days = self.date_shift_days,
                        "date shift out of range, acquisition time dropped"
                    );
                }
            }
        }
        lookup.hash_institutions();
        info!(records = records.len(), studies = studies.len(), "session anonymized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use si_core::NameOverride;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, day)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    fn record(series: &str, study: &str) -> ScanRecord {
        ScanRecord {
            institution: Some("General Hospital".to_owned()),
            device_id: Some("MR-7T-01".to_owned()),
            acq_datetime: Some(at(2)),
            ..ScanRecord::new(series, study, format!("dcm/{series}"))
        }
    }

    #[test]
    fn test_shift_datetime() {
        assert_eq!(shift_datetime(at(2), 5), Some(at(7)));
        assert_eq!(shift_datetime(at(7), -5), Some(at(2)));
        assert_eq!(shift_datetime(at(2), i64::MAX), None);
    }

    #[test]
    fn test_identifiers_replaced() {
        let mut records = vec![
            record("1.2.3.4", "1.2.3"),
            record("1.2.3.5", "1.2.3"),
            record("1.2.9.1", "1.2.9"),
        ];
        let mut lookup = LookupTable::default();
        lookup.insert("General Hospital", "AX T1", NameOverride::Suppress);

        Anonymization { date_shift_days: -30 }.apply(&mut records, &mut lookup);

        let first_study = records[0].study_uid.clone();
        assert!(first_study.starts_with("2.25."));
        assert_eq!(records[1].study_uid, first_study);
        assert_ne!(records[2].study_uid, first_study);
        assert_eq!(records[0].series_uid, format!("{first_study}.001"));
        assert_eq!(records[1].series_uid, format!("{first_study}.002"));
        assert!(records[2].series_uid.ends_with(".001"));

        let hospital = hash_bytes(b"General Hospital");
        for record in &records {
            assert_eq!(record.institution.as_deref(), Some(hospital.as_str()));
            assert_eq!(record.device_id, Some(hash_bytes(b"MR-7T-01")));
            assert_eq!(record.acq_datetime, shift_datetime(at(2), -30));
            assert!(record.source_path.as_str().starts_with("dcm/1.2."));
        }
        assert!(lookup.check(Some(&hospital), "AX T1").is_some());
    }

    #[test]
    fn test_missing_values_stay_missing() {
        let mut records = vec![ScanRecord::new("1.2.3.4", "1.2.3", "dcm/1.2.3.4")];
        Anonymization::default().apply(&mut records, &mut LookupTable::default());
        assert!(records[0].institution.is_none());
        assert!(records[0].device_id.is_none());
        assert!(records[0].acq_datetime.is_none());
    }
}
