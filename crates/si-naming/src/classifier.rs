//! Rule-based automatic naming.
//!
//! [`Classifier::classify`] maps a [`ScanRecord`] to a six-field
//! [`PartialName`] in fixed stages: orientation, dimension, contrast,
//! modality, technique, modality backfill, body part, then the exclusion and
//! coverage checks. Each stage sees the results of the earlier ones and none
//! is revisited.

use si_core::{
    AcqDim, BodyPart, ComplexComponent, ExContrast, ExclusionReason, Modality, NamingConfig,
    Orientation, PartialName, ScanRecord, SequenceBase, Technique,
};

use crate::error::NamingError;
use crate::patterns::{
    POST_CONTRAST_WORDS, Patterns, contains_not_followed_by, contains_not_preceded_by, patterns,
};

/// Returns the lower-cased description with a leading `wip` removed.
#[must_use]
pub fn working_description(description: &str) -> String {
    let lower = description.to_lowercase();
    match lower.strip_prefix("wip") {
        Some(rest) => rest.trim_start().to_owned(),
        None => lower,
    }
}

/// Returns the complex component named by an exact Siemens SWI description.
#[must_use]
pub fn description_component(description: &str) -> Option<ComplexComponent> {
    match working_description(description).as_str() {
        "swi_images" => Some(ComplexComponent::Swi),
        "mag_images" => Some(ComplexComponent::Magnitude),
        "pha_images" => Some(ComplexComponent::Phase),
        _ => None,
    }
}

fn lower_list(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn has(values: &[String], wanted: &str) -> bool {
    values.iter().any(|v| v == wanted)
}

/// Lower-cased views of the record used across stages.
struct Facts<'a> {
    record: &'a ScanRecord,
    desc: String,
    image_type: Vec<String>,
    seq_type: Vec<String>,
    variant: Vec<String>,
    options: Vec<String>,
    seq_name: String,
}

impl<'a> Facts<'a> {
    fn new(record: &'a ScanRecord) -> Self {
        Self {
            record,
            desc: working_description(&record.series_description),
            image_type: lower_list(&record.image_type),
            seq_type: lower_list(&record.sequence_type),
            variant: lower_list(&record.sequence_variant),
            options: lower_list(&record.scan_options),
            seq_name: record
                .sequence_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
        }
    }
}

/// The automatic naming classifier.
///
/// # Examples
///
/// ```
/// use si_core::{AcqDim, ApproxVector, NamingConfig, ScanRecord};
/// use si_naming::Classifier;
///
/// let mut record = ScanRecord::new("1.2.3.4", "1.2.3", "1.2.3.4");
/// record.series_description = "Sag T1 MPRAGE".to_owned();
/// record.acq_dimension = Some(AcqDim::ThreeD);
/// record.sequence_type = vec!["GR".to_owned()];
/// record.sequence_variant = vec!["SS".to_owned()];
/// record.inversion_time = Some(900.0);
/// record.echo_time = Some(3.0);
/// record.flip_angle = Some(8.0);
/// record.num_files = 176;
/// record.slice_thickness = Some(1.0);
/// record.orientation = Some(ApproxVector::from([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]));
///
/// let config = NamingConfig::default();
/// let name = Classifier::new(&config)?.classify(&record).unwrap();
/// assert_eq!(name.to_string(), "BRAIN-T1-IRFSPGR-3D-SAGITTAL-PRE");
/// # Ok::<(), si_naming::NamingError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    patterns: &'static Patterns,
    config: &'a NamingConfig,
}

impl<'a> Classifier<'a> {
    /// Creates a classifier using the given thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::Pattern`] if a built-in pattern fails to
    /// compile.
    pub fn new(config: &'a NamingConfig) -> Result<Self, NamingError> {
        Ok(Self {
            patterns: patterns()?,
            config,
        })
    }

    /// Classifies one series.
    ///
    /// # Errors
    ///
    /// Returns the [`ExclusionReason`] when the series is judged not worth
    /// converting (too few brain slices, scanner-computed diffusion map) or
    /// a value a stage needs is missing.
    pub fn classify(&self, record: &ScanRecord) -> Result<PartialName, ExclusionReason> {
        let facts = Facts::new(record);

        let orientation = record.plane();
        let dimension = record.acq_dimension.unwrap_or(if facts.desc.contains("3d") {
            AcqDim::ThreeD
        } else {
            AcqDim::TwoD
        });
        let contrast = contrast(&facts);
        let modality = modality(&facts);
        let technique = self.technique(&facts, dimension, modality)?;
        let modality = backfill_modality(modality, technique, record);
        let body_part = self.body_part(&facts, modality, orientation, technique)?;

        Ok(PartialName {
            body_part: Some(body_part),
            modality: Some(modality),
            technique: Some(technique),
            dimension: Some(dimension),
            orientation: Some(orientation),
            contrast: Some(contrast),
        })
    }

    fn technique(
        &self,
        facts: &Facts<'_>,
        dimension: AcqDim,
        modality: Modality,
    ) -> Result<Technique, ExclusionReason> {
        let record = facts.record;
        let mut base = if has(&facts.seq_type, "se") {
            SequenceBase::Se
        } else if has(&facts.seq_type, "gr") {
            SequenceBase::Gre
        } else {
            match record.flip_angle {
                Some(flip) if flip >= 60.0 => SequenceBase::Se,
                Some(_) => SequenceBase::Unknown,
                None => return Err(ExclusionReason::missing("FlipAngle")),
            }
        };

        if has(&facts.seq_type, "ep")
            || facts.seq_name.contains("epi")
            || record.epi_factor.is_some_and(|factor| factor > 1)
        {
            base = if facts.seq_name == "grase" {
                SequenceBase::Grase
            } else {
                SequenceBase::Epi
            };
        }
        if self.patterns.spgr_name.is_match(&facts.seq_name) {
            base = SequenceBase::Spgr;
        }
        if base == SequenceBase::Gre && (has(&facts.variant, "sp") || has(&facts.variant, "ss")) {
            base = SequenceBase::Spgr;
        }

        let mut technique = Technique::new(base);
        if !technique.is_echo_planar()
            && (record.echo_train_length.unwrap_or(1) > 1
                || has(&facts.options, "fast_gems")
                || facts.seq_name.contains("fse"))
        {
            technique.fast = true;
        }
        if !technique.is_echo_planar()
            && (record.inversion_time.is_some_and(|ti| ti > 50.0)
                || has(&facts.seq_type, "ir")
                || has(&facts.variant, "mp")
                || self.patterns.tfe_name.is_match(&facts.seq_name)
                || self.patterns.inversion_desc.is_match(&facts.desc))
        {
            technique.inversion_recovery = true;
        }
        if technique.inversion_recovery && dimension == AcqDim::ThreeD && !technique.fast {
            technique.fast = true;
        }
        if technique.inversion_recovery
            && technique.fast
            && (base == SequenceBase::Gre
                || (base == SequenceBase::Unknown && modality == Modality::T1))
        {
            technique.base = SequenceBase::Spgr;
        }
        Ok(technique)
    }

    fn body_part(
        &self,
        facts: &Facts<'_>,
        modality: Modality,
        orientation: Orientation,
        technique: Technique,
    ) -> Result<BodyPart, ExclusionReason> {
        let record = facts.record;
        let mut body_part = self.body_part_from_text(facts);

        if facts.seq_name.contains("me2d1r") {
            body_part = BodyPart::Spine;
        }
        if modality == Modality::Diff && orientation == Orientation::Sagittal {
            body_part = BodyPart::Spine;
        }

        // Required for every series, not only those whose coverage is checked.
        let spacing = record
            .slice_spacing
            .or(record.slice_thickness)
            .ok_or_else(|| ExclusionReason::missing("SliceThickness"))?;
        let coverage = f64::from(record.num_files) * spacing;
        let small_brain_modality = matches!(
            modality,
            Modality::T1 | Modality::T2 | Modality::T2Star | Modality::Flair
        );
        if record.num_files < self.config.min_brain_slices
            && body_part == BodyPart::Brain
            && small_brain_modality
        {
            return Err(ExclusionReason::TooFewSlices {
                files: record.num_files,
            });
        } else if modality == Modality::Diff
            && (facts.desc.ends_with("_tracew") || facts.desc.ends_with("_fa"))
        {
            return Err(ExclusionReason::DerivedMap);
        } else if body_part == BodyPart::Orbits && coverage > self.config.orbit_max_coverage_mm {
            body_part = BodyPart::Brain;
        } else if body_part == BodyPart::Brain
            && orientation == Orientation::Sagittal
            && coverage < self.config.brain_min_coverage_mm
        {
            body_part = BodyPart::Spine;
        }

        if body_part == BodyPart::Spine && upper_not_thoracic(&facts.desc) {
            body_part = BodyPart::CSpine;
        } else if body_part == BodyPart::Spine && facts.desc.contains("lower") {
            body_part = BodyPart::TSpine;
        }
        tracing::trace!(
            series = %record.series_uid,
            %body_part,
            %technique,
            "body part resolved"
        );
        Ok(body_part)
    }

    fn body_part_from_text(&self, facts: &Facts<'_>) -> BodyPart {
        let record = facts.record;
        let examined = record
            .body_part_examined
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let study: String = record
            .study_description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
            .replace(' ', "");

        for (index, text) in [facts.desc.as_str(), examined.as_str(), study.as_str()]
            .into_iter()
            .enumerate()
        {
            if let Some(pattern) = self
                .patterns
                .body_parts
                .iter()
                .find(|pattern| pattern.regex.is_match(text))
            {
                let guarded = index > 0
                    && pattern
                        .guard
                        .is_some_and(|guard| self.patterns.guard_matches(guard, &study));
                return if guarded { BodyPart::Spine } else { pattern.part };
            }
        }
        BodyPart::Brain
    }
}

/// `upper` not followed by optional whitespace and `t`.
fn upper_not_thoracic(desc: &str) -> bool {
    desc.match_indices("upper")
        .any(|(start, _)| !desc[start + "upper".len()..].trim_start().starts_with('t'))
}

fn contrast(facts: &Facts<'_>) -> ExContrast {
    let agent = facts.record.contrast_agent.as_deref().unwrap_or_default();
    let described_post = POST_CONTRAST_WORDS.iter().any(|word| facts.desc.contains(word))
        && !facts.desc.contains("pre");
    if !agent.is_empty() || described_post {
        ExContrast::Post
    } else {
        ExContrast::Pre
    }
}

fn modality(facts: &Facts<'_>) -> Modality {
    let desc = facts.desc.as_str();
    let mut candidates = Vec::new();
    if desc.contains("t1") {
        candidates.push(Modality::T1);
    }
    if desc.contains("t2") {
        candidates.push(Modality::T2);
    }
    if desc.contains("flair") {
        candidates.push(Modality::Flair);
    }
    if contains_not_followed_by(desc, "medic", "al")
        || desc.contains("t2star")
        || contains_not_followed_by(desc, "swi", "p")
        || desc.contains("t2*")
        || desc.contains("swan")
    {
        candidates.push(Modality::T2Star);
    }
    if desc.contains("stir") {
        candidates.push(Modality::Stir);
    }
    if desc.contains("dti")
        || desc.contains("diff")
        || contains_not_preceded_by(desc, "dw", "p")
        || desc.ends_with("b1000")
        || desc.ends_with("b0")
        || desc.contains("tensor")
        || has(&facts.image_type, "diffusion")
    {
        candidates.push(Modality::Diff);
    }

    let mut modality = Modality::Unknown;
    if let [only] = candidates.as_slice() {
        modality = *only;
    } else {
        let both = |a, b| candidates.contains(&a) && candidates.contains(&b);
        if both(Modality::T1, Modality::T2Star) {
            modality = Modality::T1;
        }
        if both(Modality::T1, Modality::Flair) {
            modality = Modality::T1;
        }
        if both(Modality::T2, Modality::T2Star) {
            modality = Modality::T2Star;
        }
    }

    let record = facts.record;
    if description_component(&record.series_description).is_some() {
        Modality::T2Star
    } else if facts
        .image_type
        .iter()
        .any(|tag| tag.contains("flow") || tag.contains("velocity"))
    {
        Modality::Flow
    } else if facts.image_type.iter().any(|tag| tag.contains("tof"))
        || facts.variant.iter().any(|v| v.contains("tof"))
        || contains_not_followed_by(desc, "tof", "f")
        || desc.contains("angio")
    {
        Modality::Tof
    } else if facts.variant.iter().any(|v| v.contains("mtc"))
        || record.mt_contrast
        || has(&facts.options, "mt_gems")
    {
        Modality::Mt
    } else if record.diffusion {
        Modality::Diff
    } else {
        modality
    }
}

fn backfill_modality(modality: Modality, technique: Technique, record: &ScanRecord) -> Modality {
    let echo_below = |limit: f64| record.echo_time.is_some_and(|te| te < limit);
    let mut modality = modality;
    if modality == Modality::Unknown {
        if technique.ends_with_se() {
            modality = Modality::T2;
        } else if technique.ends_with_gradient() {
            modality = if echo_below(15.0) {
                Modality::T1
            } else {
                Modality::T2Star
            };
        }
    }
    if modality == Modality::T2 && technique.inversion_recovery {
        if record.inversion_time.is_some_and(|ti| ti < 400.0) {
            Modality::Stir
        } else {
            Modality::Flair
        }
    } else if modality == Modality::T2 && technique.ends_with_gradient() {
        Modality::T2Star
    } else if modality == Modality::T2 && echo_below(30.0) {
        if record.repetition_time.is_some_and(|tr| tr > 800.0) {
            Modality::Pd
        } else {
            Modality::T1
        }
    } else {
        modality
    }
}
