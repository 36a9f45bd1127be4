//! The typed series naming model.
//!
//! A final series name has six identity fields followed by optional suffix
//! tags:
//!
//! ```text
//! {prefix}_{study:02}-{series:02}_{BODY}-{MODALITY}-{TECHNIQUE}-{DIM}-{ORIENT}-{CONTRAST}[-EXTRA...]
//! ```
//!
//! Each field is a small enum so an invalid token is rejected where it enters
//! the system (lookup table, manual override, persisted record) instead of
//! surfacing as an odd file name at conversion time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::NameParseError;

/// Implements `Serialize`/`Deserialize` through `Display`/`FromStr`.
macro_rules! string_serde {
    ($name:ty) => {
        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Declares a closed vocabulary of upper-case name tokens.
macro_rules! name_token {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the canonical upper-case token.
            #[inline]
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = NameParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(NameParseError::new($label, s)),
                }
            }
        }

        string_serde!($name);
    };
}

name_token! {
    /// Anatomical region.
    ///
    /// The spine values form a ladder (`SPINE`, `CSPINE`, `TSPINE`, `LSPINE`)
    /// used by spine-level propagation.
    pub enum BodyPart: "body part" {
        /// Brain.
        Brain => "BRAIN",
        /// Spine, level not determined.
        Spine => "SPINE",
        /// Cervical spine.
        CSpine => "CSPINE",
        /// Thoracic spine.
        TSpine => "TSPINE",
        /// Lumbar spine.
        LSpine => "LSPINE",
        /// Orbits.
        Orbits => "ORBITS",
    }
}

impl BodyPart {
    /// Spine ladder in cranio-caudal order.
    pub const SPINE_LADDER: [Self; 4] = [Self::Spine, Self::CSpine, Self::TSpine, Self::LSpine];

    /// Returns `true` for `SPINE` and its three levels.
    #[inline]
    #[must_use]
    pub const fn is_spine(self) -> bool {
        matches!(self, Self::Spine | Self::CSpine | Self::TSpine | Self::LSpine)
    }

    /// Returns the position on [`SPINE_LADDER`](Self::SPINE_LADDER).
    #[must_use]
    pub fn ladder_index(self) -> Option<usize> {
        Self::SPINE_LADDER.iter().position(|part| *part == self)
    }
}

name_token! {
    /// Image contrast.
    pub enum Modality: "modality" {
        /// T1-weighted.
        T1 => "T1",
        /// T2-weighted.
        T2 => "T2",
        /// Fluid-attenuated inversion recovery.
        Flair => "FLAIR",
        /// T2*-weighted (includes susceptibility-weighted).
        T2Star => "T2STAR",
        /// Short-tau inversion recovery.
        Stir => "STIR",
        /// Diffusion-weighted.
        Diff => "DIFF",
        /// Proton density.
        Pd => "PD",
        /// Phase-contrast flow.
        Flow => "FLOW",
        /// Time-of-flight angiography.
        Tof => "TOF",
        /// Magnetization transfer.
        Mt => "MT",
        /// Multi-echo, resolved to a concrete contrast by echo time.
        MultiEcho => "ME",
        /// Could not be determined.
        Unknown => "UNK",
    }
}

name_token! {
    /// Number of encoded spatial dimensions.
    pub enum AcqDim: "acquisition dimension" {
        /// Slice-by-slice.
        TwoD => "2D",
        /// Volumetric.
        ThreeD => "3D",
    }
}

name_token! {
    /// Acquisition plane.
    pub enum Orientation: "orientation" {
        /// Sagittal.
        Sagittal => "SAGITTAL",
        /// Coronal.
        Coronal => "CORONAL",
        /// Axial.
        Axial => "AXIAL",
        /// Plane could not be derived.
        Unspecified => "NONE",
    }
}

name_token! {
    /// Whether an exogenous contrast agent had been given.
    pub enum ExContrast: "contrast" {
        /// Before contrast.
        Pre => "PRE",
        /// After contrast.
        Post => "POST",
    }
}

name_token! {
    /// Base pulse sequence family.
    pub enum SequenceBase: "sequence" {
        /// Spin echo.
        Se => "SE",
        /// Gradient echo.
        Gre => "GRE",
        /// Spoiled gradient echo.
        Spgr => "SPGR",
        /// Echo-planar.
        Epi => "EPI",
        /// Gradient and spin echo.
        Grase => "GRASE",
        /// Could not be determined.
        Unknown => "UNK",
    }
}

/// Pulse sequence technique: optional inversion-recovery and fast prefixes
/// over a [`SequenceBase`].
///
/// # Examples
///
/// ```
/// use si_core::{SequenceBase, Technique};
///
/// let tech: Technique = "IRFSPGR".parse().unwrap();
/// assert!(tech.inversion_recovery);
/// assert!(tech.fast);
/// assert_eq!(tech.base, SequenceBase::Spgr);
/// assert_eq!(tech.to_string(), "IRFSPGR");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Technique {
    /// `IR` prefix.
    pub inversion_recovery: bool,
    /// `F` prefix.
    pub fast: bool,
    /// Sequence family.
    pub base: SequenceBase,
}

impl Technique {
    /// A plain technique without prefixes.
    #[inline]
    #[must_use]
    pub const fn new(base: SequenceBase) -> Self {
        Self {
            inversion_recovery: false,
            fast: false,
            base,
        }
    }

    /// Returns `true` when the rendered form ends in `SE` (`SE` or `GRASE`).
    #[inline]
    #[must_use]
    pub const fn ends_with_se(self) -> bool {
        matches!(self.base, SequenceBase::Se | SequenceBase::Grase)
    }

    /// Returns `true` when the rendered form ends in `GRE` or `SPGR`.
    #[inline]
    #[must_use]
    pub const fn ends_with_gradient(self) -> bool {
        matches!(self.base, SequenceBase::Gre | SequenceBase::Spgr)
    }

    /// Returns `true` for the echo-planar families, which never take prefixes.
    #[inline]
    #[must_use]
    pub const fn is_echo_planar(self) -> bool {
        matches!(self.base, SequenceBase::Epi | SequenceBase::Grase)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inversion_recovery {
            f.write_str("IR")?;
        }
        if self.fast {
            f.write_str("F")?;
        }
        f.write_str(self.base.as_str())
    }
}

impl FromStr for Technique {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let mut rest = upper.as_str();
        let inversion_recovery = rest.starts_with("IR");
        if inversion_recovery {
            rest = &rest[2..];
        }
        let fast = rest.starts_with('F');
        if fast {
            rest = &rest[1..];
        }
        let base = rest
            .parse::<SequenceBase>()
            .map_err(|_| NameParseError::new("technique", s))?;
        Ok(Self {
            inversion_recovery,
            fast,
            base,
        })
    }
}

string_serde!(Technique);

/// One of the six identity fields of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameField {
    /// [`BodyPart`].
    BodyPart,
    /// [`Modality`].
    Modality,
    /// [`Technique`].
    Technique,
    /// [`AcqDim`].
    Dimension,
    /// [`Orientation`].
    Orientation,
    /// [`ExContrast`].
    Contrast,
}

impl NameField {
    /// The six fields in name order.
    pub const ALL: [Self; 6] = [
        Self::BodyPart,
        Self::Modality,
        Self::Technique,
        Self::Dimension,
        Self::Orientation,
        Self::Contrast,
    ];
}

/// A possibly incomplete name; `None` marks an unset field.
///
/// The dash form lists the six fields in order. `NONE` in any slot, or a
/// missing trailing slot, leaves that field unset.
///
/// # Examples
///
/// ```
/// use si_core::{Modality, NameField, PartialName};
///
/// let name: PartialName = "SPINE-T2-NONE-2D".parse().unwrap();
/// assert_eq!(name.modality, Some(Modality::T2));
/// assert!(!name.is_set(NameField::Technique));
/// assert!(!name.is_complete());
/// assert_eq!(name.to_string(), "SPINE-T2-NONE-2D-NONE-NONE");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialName {
    /// Anatomical region.
    pub body_part: Option<BodyPart>,
    /// Image contrast.
    pub modality: Option<Modality>,
    /// Pulse sequence technique.
    pub technique: Option<Technique>,
    /// Acquisition dimension.
    pub dimension: Option<AcqDim>,
    /// Acquisition plane.
    pub orientation: Option<Orientation>,
    /// Contrast status.
    pub contrast: Option<ExContrast>,
}

impl PartialName {
    /// Returns `true` if `field` has a value.
    #[must_use]
    pub const fn is_set(&self, field: NameField) -> bool {
        match field {
            NameField::BodyPart => self.body_part.is_some(),
            NameField::Modality => self.modality.is_some(),
            NameField::Technique => self.technique.is_some(),
            NameField::Dimension => self.dimension.is_some(),
            NameField::Orientation => self.orientation.is_some(),
            NameField::Contrast => self.contrast.is_some(),
        }
    }

    /// Returns `true` if all six fields are set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        NameField::ALL.iter().all(|field| self.is_set(*field))
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        NameField::ALL.iter().all(|field| !self.is_set(*field))
    }

    /// Fills every unset field from `lower`.
    #[must_use]
    pub fn or(self, lower: &Self) -> Self {
        Self {
            body_part: self.body_part.or(lower.body_part),
            modality: self.modality.or(lower.modality),
            technique: self.technique.or(lower.technique),
            dimension: self.dimension.or(lower.dimension),
            orientation: self.orientation.or(lower.orientation),
            contrast: self.contrast.or(lower.contrast),
        }
    }

    /// Returns the fields if every one is set.
    #[must_use]
    pub fn complete(&self) -> Option<NameFields> {
        Some(NameFields {
            body_part: self.body_part?,
            modality: self.modality?,
            technique: self.technique?,
            dimension: self.dimension?,
            orientation: self.orientation?,
            contrast: self.contrast?,
        })
    }
}

fn slot<T: FromStr<Err = NameParseError>>(token: Option<&str>) -> Result<Option<T>, NameParseError> {
    match token.map(str::trim) {
        None | Some("") => Ok(None),
        Some(tok) if tok.eq_ignore_ascii_case("none") => Ok(None),
        Some(tok) => tok.parse().map(Some),
    }
}

impl FromStr for PartialName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.trim().split('-').collect();
        if tokens.len() > NameField::ALL.len() {
            return Err(NameParseError::new("name", s));
        }
        let mut tokens = tokens.into_iter();
        Ok(Self {
            body_part: slot(tokens.next())?,
            modality: slot(tokens.next())?,
            technique: slot(tokens.next())?,
            dimension: slot(tokens.next())?,
            orientation: slot(tokens.next())?,
            contrast: slot(tokens.next())?,
        })
    }
}

fn write_slot<T: fmt::Display>(f: &mut fmt::Formatter<'_>, value: Option<&T>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{value}"),
        None => f.write_str("NONE"),
    }
}

impl fmt::Display for PartialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_slot(f, self.body_part.as_ref())?;
        f.write_str("-")?;
        write_slot(f, self.modality.as_ref())?;
        f.write_str("-")?;
        write_slot(f, self.technique.as_ref())?;
        f.write_str("-")?;
        write_slot(f, self.dimension.as_ref())?;
        f.write_str("-")?;
        write_slot(f, self.orientation.as_ref())?;
        f.write_str("-")?;
        write_slot(f, self.contrast.as_ref())
    }
}

/// The six identity fields of a fully resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameFields {
    /// Anatomical region.
    pub body_part: BodyPart,
    /// Image contrast.
    pub modality: Modality,
    /// Pulse sequence technique.
    pub technique: Technique,
    /// Acquisition dimension.
    pub dimension: AcqDim,
    /// Acquisition plane.
    pub orientation: Orientation,
    /// Contrast status.
    pub contrast: ExContrast,
}

impl fmt::Display for NameFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}-{}",
            self.body_part,
            self.modality,
            self.technique,
            self.dimension,
            self.orientation,
            self.contrast
        )
    }
}

impl From<NameFields> for PartialName {
    fn from(fields: NameFields) -> Self {
        Self {
            body_part: Some(fields.body_part),
            modality: Some(fields.modality),
            technique: Some(fields.technique),
            dimension: Some(fields.dimension),
            orientation: Some(fields.orientation),
            contrast: Some(fields.contrast),
        }
    }
}

name_token! {
    /// Complex-image component of a reconstructed series.
    pub enum ComplexComponent: "complex component" {
        /// Magnitude.
        Magnitude => "MAGNITUDE",
        /// Phase.
        Phase => "PHASE",
        /// Real part.
        Real => "REAL",
        /// Imaginary part.
        Imaginary => "IMAGINARY",
        /// Susceptibility-weighted combination.
        Swi => "SWI",
    }
}

impl ComplexComponent {
    /// Returns the three-letter name suffix.
    #[inline]
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Magnitude => "MAG",
            Self::Phase => "PHA",
            Self::Real => "REA",
            Self::Imaginary => "IMA",
            Self::Swi => "SWI",
        }
    }
}

/// A suffix tag appended after the six identity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameExtra {
    /// Summed (multi-average) reconstruction.
    Sum,
    /// Non-distortion-corrected reconstruction.
    Nd,
    /// Magnetization-transfer reference scan.
    MtOff,
    /// Magnetization-transfer saturated scan.
    MtOn,
    /// Repeat or dynamic index, 1-based.
    Dyn(u32),
    /// Echo rank, 1-based.
    Echo(u32),
    /// Inversion-time rank, 1-based.
    Inv(u32),
    /// Complex component.
    Complex(ComplexComponent),
}

impl NameExtra {
    /// Returns `true` for [`Dyn`](Self::Dyn).
    #[inline]
    #[must_use]
    pub const fn is_dyn(self) -> bool {
        matches!(self, Self::Dyn(_))
    }

    /// Returns `true` for [`Complex`](Self::Complex).
    #[inline]
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex(_))
    }
}

impl fmt::Display for NameExtra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => f.write_str("SUM"),
            Self::Nd => f.write_str("ND"),
            Self::MtOff => f.write_str("MTOFF"),
            Self::MtOn => f.write_str("MTON"),
            Self::Dyn(n) => write!(f, "DYN{n}"),
            Self::Echo(n) => write!(f, "ECHO{n}"),
            Self::Inv(n) => write!(f, "INV{n}"),
            Self::Complex(component) => f.write_str(component.code()),
        }
    }
}

impl FromStr for NameExtra {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NameParseError::new("name suffix", s);
        let upper = s.trim().to_ascii_uppercase();
        let numbered = |prefix: &str| -> Option<Result<u32, NameParseError>> {
            upper
                .strip_prefix(prefix)
                .map(|digits| digits.parse::<u32>().map_err(|_| err()))
        };
        match upper.as_str() {
            "SUM" => return Ok(Self::Sum),
            "ND" => return Ok(Self::Nd),
            "MTOFF" => return Ok(Self::MtOff),
            "MTON" => return Ok(Self::MtOn),
            "MAG" => return Ok(Self::Complex(ComplexComponent::Magnitude)),
            "PHA" => return Ok(Self::Complex(ComplexComponent::Phase)),
            "REA" => return Ok(Self::Complex(ComplexComponent::Real)),
            "IMA" => return Ok(Self::Complex(ComplexComponent::Imaginary)),
            "SWI" => return Ok(Self::Complex(ComplexComponent::Swi)),
            _ => {}
        }
        if let Some(n) = numbered("DYN") {
            return n.map(Self::Dyn);
        }
        if let Some(n) = numbered("ECHO") {
            return n.map(Self::Echo);
        }
        if let Some(n) = numbered("INV") {
            return n.map(Self::Inv);
        }
        Err(err())
    }
}

string_serde!(NameExtra);

/// Ordered list of suffix tags.
pub type NameExtras = SmallVec<[NameExtra; 4]>;

/// A fully resolved series name.
///
/// # Examples
///
/// ```
/// use si_core::{NameExtra, SeriesName};
///
/// let mut name: SeriesName = "PROJ-0001_01_02-05_BRAIN-T2STAR-GRE-2D-AXIAL-PRE".parse().unwrap();
/// name.push_extra(NameExtra::Echo(1));
/// assert_eq!(name.prefix, "PROJ-0001_01");
/// assert_eq!(name.study, 2);
/// assert_eq!(name.series, 5);
/// assert_eq!(name.tail(), "BRAIN-T2STAR-GRE-2D-AXIAL-PRE-ECHO1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesName {
    /// Session prefix, `{PROJECT}-[{SITE}-]{SUBJECT}_{SESSION}`.
    pub prefix: String,
    /// 1-based study number within the session.
    pub study: u32,
    /// 1-based series number within the study.
    pub series: u32,
    /// The six identity fields.
    pub fields: NameFields,
    /// Suffix tags, in order.
    pub extras: NameExtras,
}

impl SeriesName {
    /// Creates a name without suffix tags.
    #[must_use]
    pub fn new(prefix: impl Into<String>, study: u32, series: u32, fields: NameFields) -> Self {
        Self {
            prefix: prefix.into(),
            study,
            series,
            fields,
            extras: SmallVec::new(),
        }
    }

    /// Appends a suffix tag.
    #[inline]
    pub fn push_extra(&mut self, extra: NameExtra) {
        self.extras.push(extra);
    }

    /// Removes every suffix tag matching `pred`.
    pub fn remove_extras(&mut self, pred: impl Fn(&NameExtra) -> bool) {
        self.extras.retain(|extra| !pred(extra));
    }

    /// Returns `true` if any suffix tag matches `pred`.
    #[must_use]
    pub fn has_extra(&self, pred: impl Fn(&NameExtra) -> bool) -> bool {
        self.extras.iter().any(pred)
    }

    /// Renders the fields and suffix tags without prefix or numbers.
    #[must_use]
    pub fn tail(&self) -> String {
        let mut out = self.fields.to_string();
        for extra in &self.extras {
            out.push('-');
            out.push_str(&extra.to_string());
        }
        out
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:02}-{:02}_{}",
            self.prefix,
            self.study,
            self.series,
            self.tail()
        )
    }
}

impl FromStr for SeriesName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NameParseError::new("series name", s);
        let mut parts = s.trim().rsplitn(3, '_');
        let tail = parts.next().ok_or_else(err)?;
        let numbers = parts.next().ok_or_else(err)?;
        let prefix = parts.next().ok_or_else(err)?;

        let (study, series) = numbers.split_once('-').ok_or_else(err)?;
        let study = study.parse().map_err(|_| err())?;
        let series = series.parse().map_err(|_| err())?;

        let tokens: Vec<&str> = tail.split('-').collect();
        if tokens.len() < NameField::ALL.len() {
            return Err(err());
        }
        let fields = NameFields {
            body_part: tokens[0].parse()?,
            modality: tokens[1].parse()?,
            technique: tokens[2].parse()?,
            dimension: tokens[3].parse()?,
            orientation: tokens[4].parse()?,
            contrast: tokens[5].parse()?,
        };
        let extras = tokens[6..]
            .iter()
            .map(|token| token.parse())
            .collect::<Result<NameExtras, _>>()?;

        Ok(Self {
            prefix: prefix.to_owned(),
            study,
            series,
            fields,
            extras,
        })
    }
}

string_serde!(SeriesName);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technique_round_trips_rendered_forms() {
        for text in ["SE", "FSE", "IRSE", "IRFSE", "GRE", "IRFSPGR", "EPI", "GRASE", "FUNK", "IRUNK"] {
            let tech: Technique = text.parse().unwrap();
            assert_eq!(tech.to_string(), text);
        }
    }

    #[test]
    fn test_technique_rejects_unknown_base() {
        assert!("IRFLASH".parse::<Technique>().is_err());
        assert!("".parse::<Technique>().is_err());
    }

    #[test]
    fn test_technique_suffix_families() {
        let grase: Technique = "GRASE".parse().unwrap();
        assert!(grase.ends_with_se());
        assert!(grase.is_echo_planar());
        let spgr: Technique = "IRFSPGR".parse().unwrap();
        assert!(spgr.ends_with_gradient());
        assert!(!spgr.ends_with_se());
    }

    #[test]
    fn test_partial_name_none_slots_unset() {
        let name: PartialName = "NONE-T1-none-3D".parse().unwrap();
        assert_eq!(name.body_part, None);
        assert_eq!(name.modality, Some(Modality::T1));
        assert_eq!(name.technique, None);
        assert_eq!(name.dimension, Some(AcqDim::ThreeD));
        assert_eq!(name.orientation, None);
        assert_eq!(name.contrast, None);
    }

    #[test]
    fn test_partial_name_rejects_bad_token() {
        let err = "BRAIN-T3".parse::<PartialName>().unwrap_err();
        assert_eq!(err.field(), "modality");
        assert!("A-B-C-D-E-F-G".parse::<PartialName>().is_err());
    }

    #[test]
    fn test_partial_name_lowercase_accepted() {
        let name: PartialName = "brain-flair-irfse-2d-axial-post".parse().unwrap();
        assert!(name.is_complete());
        assert_eq!(name.to_string(), "BRAIN-FLAIR-IRFSE-2D-AXIAL-POST");
    }

    #[test]
    fn test_partial_name_or_prefers_self() {
        let manual: PartialName = "SPINE".parse().unwrap();
        let auto: PartialName = "BRAIN-T1-SE-2D-AXIAL-PRE".parse().unwrap();
        let merged = manual.or(&auto);
        assert_eq!(merged.body_part, Some(BodyPart::Spine));
        assert_eq!(merged.modality, Some(Modality::T1));
        assert!(merged.is_complete());
    }

    #[test]
    fn test_partial_name_serde_keeps_unspecified_orientation() {
        let name = PartialName {
            orientation: Some(Orientation::Unspecified),
            ..PartialName::default()
        };
        let json = serde_json::to_string(&name).unwrap();
        assert!(json.contains(r#""orientation":"NONE""#));
        let back: PartialName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn test_series_name_display_and_parse() {
        let text = "PROJ-SITE-0001_02_01-12_SPINE-T2-FSE-2D-SAGITTAL-PRE-DYN2-MAG";
        let name: SeriesName = text.parse().unwrap();
        assert_eq!(name.prefix, "PROJ-SITE-0001_02");
        assert_eq!(name.study, 1);
        assert_eq!(name.series, 12);
        assert_eq!(
            name.extras.as_slice(),
            &[NameExtra::Dyn(2), NameExtra::Complex(ComplexComponent::Magnitude)]
        );
        assert_eq!(name.to_string(), text);
    }

    #[test]
    fn test_series_name_unspecified_orientation() {
        let name: SeriesName = "P-1_S_01-01_BRAIN-T1-SE-2D-NONE-PRE".parse().unwrap();
        assert_eq!(name.fields.orientation, Orientation::Unspecified);
    }

    #[test]
    fn test_series_name_remove_extras() {
        let mut name: SeriesName = "P-1_S_01-01_BRAIN-T1-SE-2D-AXIAL-PRE-SUM-DYN1"
            .parse()
            .unwrap();
        name.remove_extras(|extra| extra.is_dyn());
        assert_eq!(name.tail(), "BRAIN-T1-SE-2D-AXIAL-PRE-SUM");
        assert!(name.has_extra(|extra| *extra == NameExtra::Sum));
    }

    #[test]
    fn test_name_extra_parse() {
        assert_eq!("ECHO3".parse::<NameExtra>().unwrap(), NameExtra::Echo(3));
        assert_eq!("mton".parse::<NameExtra>().unwrap(), NameExtra::MtOn);
        assert!("ECHOx".parse::<NameExtra>().is_err());
        assert!("POS1".parse::<NameExtra>().is_err());
    }

    #[test]
    fn test_spine_ladder() {
        assert_eq!(BodyPart::TSpine.ladder_index(), Some(2));
        assert_eq!(BodyPart::Brain.ladder_index(), None);
        assert!(BodyPart::LSpine.is_spine());
        assert!(!BodyPart::Orbits.is_spine());
    }
}
