//! Conversion filter: drops localizers, reformats, projections and processed
//! maps before naming.

use si_core::{ExclusionReason, FilterReason, ScanRecord};
use tracing::debug;

use crate::patterns::{LOCALIZER_WORDS, Patterns, contains_not_followed_by};

fn any_type(record: &ScanRecord, pred: impl Fn(&str) -> bool) -> bool {
    record
        .image_type
        .iter()
        .any(|tag| pred(tag.to_lowercase().as_str()))
}

/// Returns why a series should not be converted, if it should not.
#[must_use]
pub fn filter_reason(record: &ScanRecord, patterns: &Patterns) -> Option<FilterReason> {
    let class = record.image_class();
    let desc = record.series_description.to_lowercase();

    if class.contains("derived") && !class.contains("primary") {
        return Some(FilterReason::Derived);
    }
    if LOCALIZER_WORDS.iter().any(|word| desc.contains(word)) || patterns.is_calibration(&desc) {
        return Some(FilterReason::Localizer);
    }
    let first_not_original = record
        .image_type
        .first()
        .is_none_or(|tag| !tag.eq_ignore_ascii_case("original"));
    if (contains_not_followed_by(&desc, "mpr", "age") && first_not_original)
        || any_type(record, |tag| tag == "mpr" || tag.contains("projection") || tag.contains("composed"))
        || desc.contains("composed")
    {
        return Some(FilterReason::Reformat);
    }
    if desc.contains("mip") || any_type(record, |tag| tag == "mnip" || tag == "maximum") {
        return Some(FilterReason::Projection);
    }
    if any_type(record, |tag| {
        tag.contains("adc") || tag == "sub" || tag == "sum" || patterns.t2_map.is_match(tag)
    }) {
        return Some(FilterReason::Processed);
    }
    None
}

/// Returns `true` if a secondary PAR reconstruction should be dropped.
///
/// A reconstruction other than 1 is kept only when no reconstruction 1 of
/// the same series number exists and it is a summed (`sWIP`) image.
#[must_use]
pub fn is_superseded_reconstruction(record: &ScanRecord, all: &[ScanRecord]) -> bool {
    if record.recon_number.is_none_or(|recon| recon <= 1) {
        return false;
    }
    let has_primary = all
        .iter()
        .any(|other| other.series_number == record.series_number && other.recon_number == Some(1));
    has_primary || !record.series_description.starts_with("sWIP")
}

/// Applies the conversion filter to every record, excluding the ones it
/// drops. Returns the number of records excluded.
pub fn apply_filter(records: &mut [ScanRecord], patterns: &Patterns) -> usize {
    let superseded: Vec<bool> = records
        .iter()
        .map(|record| is_superseded_reconstruction(record, records))
        .collect();

    let mut excluded = 0;
    for (record, superseded) in records.iter_mut().zip(superseded) {
        let reason = filter_reason(record, patterns)
            .or_else(|| superseded.then_some(FilterReason::SecondaryReconstruction));
        if let Some(filter) = reason {
            debug!(series = %record.series_uid, ?filter, "filtered before naming");
            record.exclude(ExclusionReason::Filtered { filter });
            excluded += 1;
        }
    }
    excluded
}
