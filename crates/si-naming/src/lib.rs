//! Series naming for the seriesid pipeline.
//!
//! Every convertible series gets a name of the form
//! `{prefix}_{study:02}-{series:02}_{BODY}-{MODALITY}-{TECHNIQUE}-{DIM}-{ORIENT}-{CONTRAST}[-EXTRA...]`
//! that is unique within its session. The stage is built from:
//!
//! - [`filter`] - drops localizers, reformats and processed maps
//! - [`classifier`] - rule-based automatic naming from header attributes
//! - [`lookup`] / [`manual`] - operator overrides loaded from disk
//! - [`merge`] - manual over lookup over automatic, field by field
//! - [`numbering`] - study and series numbers
//! - [`resolver`] - session-wide disambiguation passes
//! - [`pipeline`] - all of the above in order ([`name_records`])
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use si_core::{Config, RunContext};
//! use si_naming::{load_lookup_table, load_manual_names, name_records};
//!
//! let ctx = RunContext::new(Config::default());
//! let lookup = load_lookup_table(Utf8Path::new("lut.csv"), "STUDY", None)?;
//! let manual = load_manual_names(Utf8Path::new("STUDY-0042_01_ManualNaming.json"))?;
//!
//! let mut records: Vec<si_core::ScanRecord> = Vec::new();
//! let report = name_records(&mut records, "STUDY-0042_01", &lookup, &manual, &ctx)?;
//! println!("{} series named", report.named);
//! # Ok::<(), si_naming::NamingError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod classifier;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod manual;
pub mod merge;
pub mod numbering;
pub mod patterns;
pub mod pipeline;
pub mod resolver;

pub use classifier::{Classifier, description_component, working_description};
pub use error::NamingError;
pub use filter::{apply_filter, filter_reason, is_superseded_reconstruction};
pub use lookup::{LOOKUP_COLUMNS, create_lookup_table, load_lookup_table};
pub use manual::load_manual_names;
pub use merge::merge_name;
pub use numbering::{SeriesNumbers, number_records};
pub use patterns::{Patterns, patterns};
pub use pipeline::{NamingReport, name_records};
pub use resolver::{duplicate_names, find_closest, resolve_names};
