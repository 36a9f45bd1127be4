//! Session-wide name disambiguation.
//!
//! After every record has a provisional [`SeriesName`], the resolver runs a
//! fixed sequence of passes over the sorted record list:
//!
//! 1. Summation and no-distortion-correction tags (`-SUM`, `-ND`)
//! 2. Magnetization-transfer pairing (`-MTOFF` / `-MTON`)
//! 3. Spine level propagation along the table position
//! 4. Temporary `-DYN{n}` tags for sub-series sharing a root acquisition
//! 5. Collision resolution by the fingerprint field that differs
//! 6. Default complex component for T2* series
//! 7. Suppression of derived copies of original series
//!
//! Passes are order-sensitive: each one sees the names produced by the
//! previous ones, and within a pass records are visited in list order.

use si_core::{
    BodyPart, ComplexComponent, ExclusionReason, Fingerprint, FingerprintField, FxHashMap,
    FxHashSet, Modality, NameExtra, NamingConfig, ScanRecord, SeriesName, VECTOR_EPSILON, fx_hash_map,
};
use tracing::{debug, warn};

fn approx_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= VECTOR_EPSILON,
        (None, None) => true,
        _ => false,
    }
}

/// Returns the candidate closest to `target`; ties go to the lower index.
///
/// # Examples
///
/// ```
/// use si_naming::resolver::find_closest;
///
/// assert_eq!(find_closest(5, &[2, 7, 9]), Some(7));
/// assert_eq!(find_closest(5, &[3, 7]), Some(3));
/// assert_eq!(find_closest(5, &[]), None);
/// ```
#[must_use]
pub fn find_closest(target: usize, candidates: &[usize]) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .min_by_key(|&candidate| (candidate.abs_diff(target), candidate))
}

/// Returns `tail()` of `name` with its modality replaced.
fn tail_with_modality(name: &SeriesName, modality: Modality) -> String {
    let mut swapped = name.clone();
    swapped.fields.modality = modality;
    swapped.tail()
}

fn modality(record: &ScanRecord) -> Option<Modality> {
    record.final_name.as_ref().map(|name| name.fields.modality)
}

fn push_extra(record: &mut ScanRecord, extra: NameExtra) {
    if let Some(name) = record.final_name.as_mut() {
        name.push_extra(extra);
    }
}

/// Pass 1: Philips summed images and Siemens non-distortion-corrected
/// reconstructions.
fn tag_summation(records: &mut [ScanRecord]) {
    for record in records.iter_mut() {
        let desc = &record.series_description;
        let summed = desc.starts_with("sWIP") || desc.starts_with("smFFE");
        let no_correction = record.manufacturer.as_deref() == Some("SIEMENS")
            && record.image_type.iter().any(|tag| tag.eq_ignore_ascii_case("nd"))
            && desc.to_lowercase().ends_with("_nd");
        if summed {
            push_extra(record, NameExtra::Sum);
        }
        if no_correction {
            push_extra(record, NameExtra::Nd);
        }
    }
}

/// Pass 2: a T1 or T2* series that matches an MT series apart from the
/// modality is its reference scan.
fn pair_magnetization_transfer(records: &mut [ScanRecord]) {
    for i in 0..records.len() {
        let Some(name) = records[i].final_name.as_ref() else {
            continue;
        };
        let own = name.fields.modality;
        if !matches!(own, Modality::T1 | Modality::T2Star) {
            continue;
        }
        let tail = name.tail();
        let candidates: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, other)| {
                other.final_name.as_ref().is_some_and(|other_name| {
                    other_name.fields.modality == Modality::Mt
                        && tail_with_modality(other_name, own) == tail
                })
            })
            .filter(|(_, other)| {
                approx_eq(other.echo_time, records[i].echo_time)
                    && approx_eq(other.flip_angle, records[i].flip_angle)
                    && approx_eq(other.repetition_time, records[i].repetition_time)
            })
            .map(|(j, _)| j)
            .collect();

        if let Some(closest) = find_closest(i, &candidates) {
            debug!(
                reference = %records[i].series_uid,
                saturated = %records[closest].series_uid,
                "paired magnetization transfer scans"
            );
            if let Some(name) = records[i].final_name.as_mut() {
                name.fields.modality = Modality::Mt;
                name.push_extra(NameExtra::MtOff);
            }
            push_extra(&mut records[closest], NameExtra::MtOn);
        }
    }
}

/// Pass 3: series of one spine protocol, ordered from head to foot, step
/// down the spine ladder wherever the table moved by more than the gap.
fn propagate_spine_levels(records: &mut [ScanRecord], gap_mm: f64) {
    let mut groups: Vec<((String, String), Vec<usize>)> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let Some(name) = record.final_name.as_ref() else {
            continue;
        };
        let manual_body_part = record.manual_name.is_some_and(|m| m.body_part.is_some());
        if !name.fields.body_part.is_spine() || manual_body_part {
            continue;
        }
        if record.position_z().is_none() {
            debug!(series = %record.series_uid, "spine series without position");
            continue;
        }
        let key = (record.study_uid.clone(), record.series_description.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(index),
            None => groups.push((key, vec![index])),
        }
    }

    for (_, mut members) in groups {
        members.sort_by(|&a, &b| {
            let za = records[a].position_z().unwrap_or_default();
            let zb = records[b].position_z().unwrap_or_default();
            zb.total_cmp(&za)
        });
        let mut level = 0;
        let mut previous_z = 0.0;
        for (pos, &index) in members.iter().enumerate() {
            let z = records[index].position_z().unwrap_or_default();
            let Some(name) = records[index].final_name.as_mut() else {
                continue;
            };
            if pos == 0 {
                if name.fields.body_part == BodyPart::Spine {
                    name.fields.body_part = BodyPart::CSpine;
                }
                level = name.fields.body_part.ladder_index().unwrap_or_default();
            } else {
                if (z - previous_z).abs() > gap_mm {
                    level = (level + 1).min(BodyPart::SPINE_LADDER.len() - 1);
                }
                name.fields.body_part = BodyPart::SPINE_LADDER[level];
            }
            previous_z = z;
        }
    }
}

/// Pass 4: groups of named records sharing a root UID, in discovery order.
/// Groups with more than one member get temporary `-DYN{n}` tags.
fn group_by_root(records: &mut [ScanRecord]) -> Vec<Vec<usize>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, Vec<usize>> = fx_hash_map();
    for (index, record) in records.iter().enumerate() {
        if record.final_name.is_none() {
            continue;
        }
        let root = record.root_uid().to_owned();
        if !groups.contains_key(&root) {
            order.push(root.clone());
        }
        groups.entry(root).or_default().push(index);
    }

    let groups: Vec<Vec<usize>> = order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .filter(|members| members.len() > 1)
        .collect();
    for members in &groups {
        for (n, &index) in (1_u32..).zip(members) {
            push_extra(&mut records[index], NameExtra::Dyn(n));
        }
    }
    groups
}

/// A field ranked by value, its accessor and the tag it produces.
type Ranked = (FingerprintField, fn(&ScanRecord) -> Option<f64>, fn(u32) -> NameExtra);

/// 1-based rank of each member's value among the group's distinct values.
fn ranks(values: &[Option<f64>]) -> Vec<u32> {
    let mut distinct: Vec<Option<f64>> = Vec::new();
    for value in values {
        if !distinct.iter().any(|d| approx_eq(*d, *value)) {
            distinct.push(*value);
        }
    }
    distinct.sort_by(|a, b| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    });
    values
        .iter()
        .map(|value| {
            let index = distinct
                .iter()
                .position(|d| approx_eq(*d, *value))
                .unwrap_or_default();
            u32::try_from(index + 1).unwrap_or(u32::MAX)
        })
        .collect()
}

/// Pass 5: replaces the temporary tags of one root group with tags naming
/// what actually differs between its members.
fn resolve_collision(records: &mut [ScanRecord], members: &[usize]) {
    let fingerprints: Vec<Fingerprint> = members.iter().map(|&i| records[i].fingerprint()).collect();
    let refs: Vec<&Fingerprint> = fingerprints.iter().collect();
    let mut differing: Vec<FingerprintField> = Fingerprint::differing_fields(&refs)
        .into_iter()
        .filter(|field| *field != FingerprintField::ImageType)
        .collect();
    if differing.is_empty() {
        return;
    }

    for &index in members {
        if let Some(name) = records[index].final_name.as_mut() {
            name.remove_extras(|extra| extra.is_dyn());
        }
    }

    let body_parts: FxHashSet<Option<BodyPart>> = members
        .iter()
        .map(|&i| records[i].final_name.as_ref().map(|n| n.fields.body_part))
        .collect();
    if body_parts.len() == members.len() {
        return;
    }

    if differing.contains(&FingerprintField::Orientation) {
        warn!(
            root = %records[members[0]].root_uid(),
            "sub-series differ in orientation, names left ambiguous"
        );
        return;
    }

    let take = |differing: &mut Vec<FingerprintField>, field| {
        let found = differing.contains(&field);
        differing.retain(|f| *f != field);
        found
    };

    if differing.contains(&FingerprintField::EchoTime)
        && members.iter().any(|&i| modality(&records[i]) == Some(Modality::T2Star))
    {
        for &index in members {
            if let Some(name) = records[index].final_name.as_mut() {
                name.fields.modality = Modality::T2Star;
            }
        }
    }

    let ranked: [Ranked; 2] = [
        (FingerprintField::InversionTime, |r| r.inversion_time, NameExtra::Inv),
        (FingerprintField::EchoTime, |r| r.echo_time, NameExtra::Echo),
    ];
    for (field, value, extra) in ranked {
        if take(&mut differing, field) {
            let values: Vec<Option<f64>> = members.iter().map(|&i| value(&records[i])).collect();
            for (&index, rank) in members.iter().zip(ranks(&values)) {
                push_extra(&mut records[index], extra(rank));
            }
        }
    }

    if take(&mut differing, FingerprintField::ComplexComponent) {
        for &index in members {
            if let Some(component) = records[index].complex {
                push_extra(&mut records[index], NameExtra::Complex(component));
            }
        }
    }

    if !differing.is_empty() {
        debug!(
            root = %records[members[0]].root_uid(),
            ?differing,
            "falling back to DYN tags"
        );
        for (n, &index) in (1_u32..).zip(members) {
            push_extra(&mut records[index], NameExtra::Dyn(n));
        }
    }
}

/// Pass 6: every T2* series ends in a complex component tag.
fn default_complex(records: &mut [ScanRecord]) {
    for record in records.iter_mut() {
        let component = record.complex.unwrap_or(ComplexComponent::Magnitude);
        let Some(name) = record.final_name.as_mut() else {
            continue;
        };
        let tagged = matches!(
            name.extras.last(),
            Some(NameExtra::Complex(
                ComplexComponent::Magnitude | ComplexComponent::Phase | ComplexComponent::Swi
            ))
        );
        if name.fields.modality == Modality::T2Star && !tagged {
            name.push_extra(NameExtra::Complex(component));
        }
    }
}

/// Pass 7: a `DERIVED PRIMARY` series named like an `ORIGINAL PRIMARY` one is
/// a scanner-side copy.
fn suppress_derived(records: &mut [ScanRecord]) {
    let originals: FxHashSet<String> = records
        .iter()
        .filter(|record| record.is_original_primary())
        .filter_map(ScanRecord::final_name_string)
        .collect();
    for record in records.iter_mut() {
        let redundant = record.is_derived_primary()
            && record
                .final_name_string()
                .is_some_and(|name| originals.contains(&name));
        if redundant {
            debug!(series = %record.series_uid, "derived copy of an original series");
            record.exclude(ExclusionReason::RedundantDerived);
        }
    }
}

/// Returns the final names carried by more than one record.
#[must_use]
pub fn duplicate_names(records: &[ScanRecord]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut duplicates: Vec<String> = records
        .iter()
        .filter_map(ScanRecord::final_name_string)
        .filter(|name| !seen.insert(name.clone()))
        .collect();
    duplicates.sort();
    duplicates.dedup();
    duplicates
}

/// Runs every disambiguation pass over a sorted record list.
///
/// Records without a final name are left untouched. Any name still shared
/// afterwards (only possible for sub-series that differ in orientation) is
/// logged as a warning.
pub fn resolve_names(records: &mut [ScanRecord], config: &NamingConfig) {
    tag_summation(records);
    pair_magnetization_transfer(records);
    propagate_spine_levels(records, config.spine_gap_mm);
    for members in group_by_root(records) {
        resolve_collision(records, &members);
    }
    default_complex(records);
    suppress_derived(records);

    for name in duplicate_names(records) {
        warn!(%name, "final name is not unique");
    }
}
