//! Domain types for the seriesid pipeline.
//!
//! # Module Organization
//!
//! - [`name`] - Name field enums, [`PartialName`], [`SeriesName`]
//! - [`vector`] - Tolerant orientation and position vectors
//! - [`fingerprint`] - Sub-series identity
//! - [`record`] - [`ScanRecord`] and exclusion reasons
//! - [`overrides`] - Lookup table and manual names
//! - [`session`] - Session identity and the record set
//!
//! All public types are re-exported here and at the crate root.

pub mod fingerprint;
pub mod name;
pub mod overrides;
pub mod record;
pub mod session;
pub mod vector;

pub use fingerprint::{Fingerprint, FingerprintField, FingerprintKey};
pub use name::{
    AcqDim, BodyPart, ComplexComponent, ExContrast, Modality, NameExtra, NameExtras, NameField,
    NameFields, Orientation, PartialName, SequenceBase, SeriesName, Technique,
};
pub use overrides::{LookupTable, ManualNames, NameOverride, WILDCARD_INSTITUTION};
pub use record::{ExclusionReason, FilterReason, OverrideSource, ScanRecord, sort_records};
pub use session::{RawFormat, Session, SessionId};
pub use vector::{ApproxVector, VECTOR_EPSILON};
