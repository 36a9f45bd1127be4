//! The format-independent description of one physical series.

use std::cmp::Ordering;
use std::fmt;

use camino::Utf8PathBuf;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::name::{AcqDim, ComplexComponent, NameField, Orientation, PartialName, SeriesName};
use super::vector::ApproxVector;

/// Why the conversion filter dropped a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FilterReason {
    /// Derived image type other than `DERIVED PRIMARY`.
    Derived,
    /// Localizer, survey, scout or calibration scan.
    Localizer,
    /// Multi-planar reformat or composed image.
    Reformat,
    /// Maximum or minimum intensity projection.
    Projection,
    /// Processed map (ADC, subtraction, sum, T2 map).
    Processed,
    /// Secondary PAR reconstruction superseded by reconstruction 1.
    SecondaryReconstruction,
}

/// Which operator override suppressed a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    /// The per-session manual naming file.
    Manual,
    /// The project lookup table.
    Lookup,
}

/// Why a series will not be converted.
///
/// Exclusion is not an error: the record stays in the session with its
/// reason so that the operator can review it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ExclusionReason {
    /// Dropped by the conversion filter before naming.
    Filtered {
        /// Filter category.
        filter: FilterReason,
    },
    /// Marked `FALSE` by an override.
    Suppressed {
        /// Override that suppressed it.
        by: OverrideSource,
    },
    /// Too few brain slices to be a diagnostic volume.
    TooFewSlices {
        /// Number of files in the series.
        files: u32,
    },
    /// Scanner-computed diffusion map (trace or FA).
    DerivedMap,
    /// A value needed by the classifier is absent.
    MissingField {
        /// Attribute name.
        field: String,
    },
    /// Merged name still lacks a field.
    IncompleteName {
        /// Fields left unset.
        missing: Vec<NameField>,
    },
    /// Derived copy of an original series with the same final name.
    RedundantDerived,
}

impl ExclusionReason {
    /// Creates a [`MissingField`](Self::MissingField) reason.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Returns `true` for reasons that come from a classification failure
    /// rather than a deliberate skip.
    #[inline]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::IncompleteName { .. })
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtered { filter } => write!(f, "filtered ({filter:?})"),
            Self::Suppressed { by } => write!(f, "suppressed by {by:?} override"),
            Self::TooFewSlices { files } => write!(f, "too few slices ({files})"),
            Self::DerivedMap => f.write_str("derived diffusion map"),
            Self::MissingField { field } => write!(f, "missing {field}"),
            Self::IncompleteName { missing } => write!(f, "incomplete name, missing {missing:?}"),
            Self::RedundantDerived => f.write_str("derived duplicate of an original series"),
        }
    }
}

/// One physical series.
///
/// Readers populate the identity and descriptive attributes; the naming
/// stages fill in the classification outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRecord {
    // Identity
    /// Series (or sub-series) identifier; the sorted directory name.
    pub series_uid: String,
    /// Study identifier.
    pub study_uid: String,
    /// Raw file group, relative to the session's raw directory.
    pub source_path: Utf8PathBuf,
    /// Content hash of the raw file group.
    pub source_hash: Option<String>,

    // Descriptive attributes
    /// Institution name.
    pub institution: Option<String>,
    /// Upper-cased first word of the manufacturer.
    pub manufacturer: Option<String>,
    /// Scanner model name.
    pub scanner_model: Option<String>,
    /// Device serial or station identifier.
    pub device_id: Option<String>,
    /// Series description, falling back to protocol name.
    pub series_description: String,
    /// Study description.
    pub study_description: Option<String>,
    /// Series date and time.
    pub acq_datetime: Option<NaiveDateTime>,
    /// Magnetic field strength (T).
    pub field_strength: Option<f64>,
    /// Reader-supplied acquisition dimension.
    pub acq_dimension: Option<AcqDim>,
    /// Spacing between slices (mm).
    pub slice_spacing: Option<f64>,
    /// Slice thickness (mm).
    pub slice_thickness: Option<f64>,
    /// Flip angle (degrees).
    pub flip_angle: Option<f64>,
    /// Repetition time (ms).
    pub repetition_time: Option<f64>,
    /// Echo time (ms).
    pub echo_time: Option<f64>,
    /// Inversion time (ms).
    pub inversion_time: Option<f64>,
    /// Trigger time (ms).
    pub trigger_time: Option<f64>,
    /// Echo train length.
    pub echo_train_length: Option<u32>,
    /// EPI factor.
    pub epi_factor: Option<u32>,
    /// Acquisition matrix (frequency, phase).
    pub acquisition_matrix: Option<Vec<u32>>,
    /// Reconstruction matrix (columns, rows).
    pub recon_matrix: Option<Vec<u32>>,
    /// Reconstructed in-plane resolution (mm).
    pub recon_resolution: Option<Vec<f64>>,
    /// Acquired in-plane resolution (mm).
    pub acquired_resolution: Option<Vec<f64>>,
    /// Field of view (mm).
    pub field_of_view: Option<Vec<f64>>,
    /// Scanning sequence tags, upper-case.
    pub sequence_type: Vec<String>,
    /// Sequence variant tags, upper-case.
    pub sequence_variant: Vec<String>,
    /// Vendor sequence name.
    pub sequence_name: Option<String>,
    /// Scan option tags, upper-case.
    pub scan_options: Vec<String>,
    /// Image type tags, upper-case.
    pub image_type: Vec<String>,
    /// Series number.
    pub series_number: Option<i64>,
    /// Complex-image component.
    pub complex: Option<ComplexComponent>,
    /// Body part examined.
    pub body_part_examined: Option<String>,
    /// Contrast agent.
    pub contrast_agent: Option<String>,
    /// Orientation vector.
    pub orientation: Option<ApproxVector>,
    /// Image position vector.
    pub position: Option<ApproxVector>,
    /// Number of files, or frames for a multi-frame record.
    pub num_files: u32,
    /// Whether the record came from a multi-frame container.
    pub multi_frame: bool,
    /// PAR magnetization-transfer contrast flag.
    pub mt_contrast: bool,
    /// PAR diffusion flag.
    pub diffusion: bool,
    /// PAR reconstruction number.
    pub recon_number: Option<u32>,

    // Classification outputs
    /// Name from the manual override file.
    pub manual_name: Option<PartialName>,
    /// Name from the lookup table.
    pub lookup_name: Option<PartialName>,
    /// Name from automatic classification.
    pub predicted_name: Option<PartialName>,
    /// Resolved name.
    pub final_name: Option<SeriesName>,
    /// Whether conversion produced every expected output.
    pub converted: bool,
    /// Hash over the produced outputs.
    pub output_hash: Option<String>,
    /// Conversion failure message.
    pub failure: Option<String>,
    /// Why the record will not be converted.
    pub exclusion: Option<ExclusionReason>,
}

impl ScanRecord {
    /// Creates a record with the three identity fields set.
    #[must_use]
    pub fn new(
        series_uid: impl Into<String>,
        study_uid: impl Into<String>,
        source_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            series_uid: series_uid.into(),
            study_uid: study_uid.into(),
            source_path: source_path.into(),
            ..Self::default()
        }
    }

    /// Returns `true` unless the record was excluded.
    #[inline]
    #[must_use]
    pub const fn convert_image(&self) -> bool {
        self.exclusion.is_none()
    }

    /// Excludes the record from conversion and drops its final name.
    pub fn exclude(&mut self, reason: ExclusionReason) {
        self.exclusion = Some(reason);
        self.final_name = None;
    }

    /// Records a conversion failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.converted = false;
        self.failure = Some(message.into());
    }

    /// Returns the acquisition plane derived from the orientation vector.
    #[must_use]
    pub fn plane(&self) -> Orientation {
        self.orientation
            .as_ref()
            .map_or(Orientation::Unspecified, ApproxVector::plane)
    }

    /// Returns the intra-series identity.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            orientation: self.orientation.clone(),
            repetition_time: self.repetition_time,
            flip_angle: self.flip_angle,
            echo_time: self.echo_time,
            trigger_time: self.trigger_time,
            inversion_time: self.inversion_time,
            complex: self.complex,
            image_type: self.image_type.clone(),
        }
    }

    /// Returns the series UID without its last `.`-component.
    ///
    /// # Examples
    ///
    /// ```
    /// use si_core::ScanRecord;
    ///
    /// let record = ScanRecord::new("1.2.840.99.7", "1.2.840", "dcm/1.2.840.99.7");
    /// assert_eq!(record.root_uid(), "1.2.840.99");
    /// ```
    #[must_use]
    pub fn root_uid(&self) -> &str {
        self.series_uid
            .rsplit_once('.')
            .map_or("", |(root, _)| root)
    }

    /// Returns the first two image type tags joined, lower-cased.
    #[must_use]
    pub fn image_class(&self) -> String {
        self.image_type
            .iter()
            .take(2)
            .map(|tag| tag.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns `true` for `DERIVED PRIMARY` images.
    #[must_use]
    pub fn is_derived_primary(&self) -> bool {
        self.image_class() == "derived primary"
    }

    /// Returns `true` for `ORIGINAL PRIMARY` images.
    #[must_use]
    pub fn is_original_primary(&self) -> bool {
        self.image_class() == "original primary"
    }

    /// Returns the z component of the image position, if present.
    #[must_use]
    pub fn position_z(&self) -> Option<f64> {
        self.position.as_ref().and_then(|p| p.get(2))
    }

    /// Returns the rendered final name.
    #[must_use]
    pub fn final_name_string(&self) -> Option<String> {
        self.final_name.as_ref().map(ToString::to_string)
    }

    fn display_cmp(&self, other: &Self) -> Ordering {
        self.study_uid
            .cmp(&other.study_uid)
            .then_with(|| self.series_number.cmp(&other.series_number))
            .then_with(|| self.series_uid.cmp(&other.series_uid))
    }
}

/// Sorts records by `(study, series number, series uid)` with convertible
/// records ahead of excluded ones.
pub fn sort_records(records: &mut [ScanRecord]) {
    records.sort_by(ScanRecord::display_cmp);
    records.sort_by_key(|record| !record.convert_image());
}
