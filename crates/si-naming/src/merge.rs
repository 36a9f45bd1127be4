//! Override merge: manual names over the lookup table over automatic naming.

use si_core::{
    ExclusionReason, LookupTable, ManualNames, Modality, NameField, NameFields, NameOverride,
    OverrideSource, PartialName, ScanRecord, Technique,
};
use tracing::debug;

use crate::classifier::{Classifier, description_component};

/// Turns the ambiguous multi-echo modality into a concrete one.
///
/// `technique` is the name's own technique, or the merged one when the name
/// does not set it.
fn resolve_multi_echo(
    name: &mut PartialName,
    technique: Option<Technique>,
    echo_time: Option<f64>,
) -> Result<(), ExclusionReason> {
    if name.modality != Some(Modality::MultiEcho) {
        return Ok(());
    }
    let te = echo_time.ok_or_else(|| ExclusionReason::missing("EchoTime"))?;
    let spin_echo = name.technique.or(technique).is_some_and(Technique::ends_with_se);
    name.modality = Some(match (spin_echo, te) {
        (true, te) if te < 30.0 => Modality::Pd,
        (true, _) => Modality::T2,
        (false, te) if te < 15.0 => Modality::T1,
        (false, _) => Modality::T2Star,
    });
    Ok(())
}

fn override_name(
    value: Option<&NameOverride>,
    by: OverrideSource,
) -> Result<Option<PartialName>, ExclusionReason> {
    match value {
        Some(NameOverride::Suppress) => Err(ExclusionReason::Suppressed { by }),
        Some(NameOverride::Name(name)) => Ok(Some(*name)),
        None => Ok(None),
    }
}

/// Resolves the six name fields of one record from its three sources.
///
/// The manual and lookup names are looked up and stored on the record along
/// with the automatic prediction. Automatic naming only runs when neither
/// override is complete. Fields are then taken from the first source that
/// sets them, in manual, lookup, automatic order.
///
/// # Errors
///
/// Returns the [`ExclusionReason`] when an override suppresses the record,
/// the classifier excludes it, or the merged name is still incomplete.
pub fn merge_name(
    record: &mut ScanRecord,
    classifier: &Classifier<'_>,
    lookup: &LookupTable,
    manual: &ManualNames,
) -> Result<NameFields, ExclusionReason> {
    let mut man = override_name(
        manual.get(record.source_path.as_str()),
        OverrideSource::Manual,
    )?
    .unwrap_or_default();
    let mut lut = override_name(
        lookup.check(record.institution.as_deref(), &record.series_description),
        OverrideSource::Lookup,
    )?
    .unwrap_or_default();

    let mut pred = PartialName::default();
    if !man.is_complete() && !lut.is_complete() {
        debug!(series = %record.series_uid, "override incomplete, using automatic naming");
        if let Some(component) = description_component(&record.series_description) {
            record.complex = Some(component);
        }
        pred = classifier.classify(record)?;
    }

    let technique = man.or(&lut).or(&pred).technique;
    for name in [&mut man, &mut lut, &mut pred] {
        resolve_multi_echo(name, technique, record.echo_time)?;
    }

    record.manual_name = (!man.is_empty()).then_some(man);
    record.lookup_name = (!lut.is_empty()).then_some(lut);
    record.predicted_name = (!pred.is_empty()).then_some(pred);

    let merged = man.or(&lut).or(&pred);
    merged.complete().ok_or_else(|| ExclusionReason::IncompleteName {
        missing: NameField::ALL
            .into_iter()
            .filter(|field| !merged.is_set(*field))
            .collect(),
    })
}
