//! Core types, errors, and utilities for the seriesid pipeline.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`ScanRecord`], the format-independent description of one series
//! - The typed naming model ([`PartialName`], [`SeriesName`] and the six
//!   field enums)
//! - [`Fingerprint`], the intra-series identity used for sorting and
//!   collision detection
//! - [`Session`], [`SessionId`], and the operator overrides
//!   ([`LookupTable`], [`ManualNames`])
//! - Configuration ([`Config`]), the explicit [`RunContext`], and
//!   atomic [`RunStats`]
//! - SHA-256 content hashing ([`digest`]) and `FxHashMap`/`FxHashSet`
//!   aliases
//!
//! # Example
//!
//! ```
//! use si_core::{NameFields, PartialName, SeriesName};
//!
//! let partial: PartialName = "BRAIN-T1-IRFSPGR-3D-SAGITTAL-PRE".parse()?;
//! let fields = partial.complete().expect("all six fields are set");
//!
//! let name = SeriesName::new("STUDY-0042_01", 1, 3, fields);
//! assert_eq!(
//!     name.to_string(),
//!     "STUDY-0042_01_01-03_BRAIN-T1-IRFSPGR-3D-SAGITTAL-PRE"
//! );
//! # let _: NameFields = fields;
//! # Ok::<(), si_core::NameParseError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod hash;
pub mod stats;
pub mod types;

pub use config::{Config, ConvertConfig, NamingConfig, SortConfig};
pub use context::RunContext;
pub use error::{ConfigError, NameParseError};
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set};
pub use stats::{RunStats, StatsSnapshot};
pub use types::*;
