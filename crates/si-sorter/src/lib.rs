//! Raw directory sorting for the seriesid pipeline.
//!
//! A raw session directory arrives in whatever layout the scanner export
//! produced. This crate restructures it so that later stages can work per
//! series:
//!
//! - [`sort_dicom`]: one subdirectory per series or sub-series, duplicates
//!   removed, everything unusable deleted
//! - [`sort_parrec`]: complete PAR/REC pairs flattened to the top level
//! - [`load_dicom_records`] / [`load_parrec_records`]: one
//!   [`ScanRecord`](si_core::ScanRecord) per series from a sorted directory
//!
//! Both sorters are idempotent: sorting an already sorted directory moves
//! nothing.
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use si_core::{Config, RunContext};
//! use si_sorter::{load_dicom_records, sort_dicom};
//!
//! let ctx = RunContext::new(Config::default());
//! let raw = Utf8Path::new("session/dcm");
//! let report = sort_dicom(raw, &ctx)?;
//! println!("{} series, {} duplicates removed", report.series.len(), report.duplicates_removed);
//!
//! for record in load_dicom_records(raw)? {
//!     println!("{} {}", record.series_uid, record.series_description);
//! }
//! # Ok::<(), si_sorter::SortError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod parrec;
pub mod records;
pub mod sorter;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use error::SortError;
pub use parrec::{is_par, rec_for, sort_parrec};
pub use records::{load_dicom_records, load_parrec_records};
pub use sorter::{SortReport, sort_dicom};
pub use walker::{FileWalker, list_dir};
