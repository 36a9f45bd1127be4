//! Conversion orchestration, session records and provenance for seriesid.
//!
//! This crate drives a whole session from raw files to named volumes:
//!
//! - [`convert_session`]: stage, sort, name and convert a source directory
//!   or archive into a new session directory, optionally anonymized
//! - [`update_session`]: rename and reconvert an existing session after the
//!   overrides or the tool changed, rolling back on failure
//! - [`convert_records`]: one [`Converter`] call per raw file group, with
//!   output validation and renaming
//! - [`SessionRecord`] and [`Provenance`]: what was converted, from which
//!   inputs, by whom
//!
//! The external converter sits behind the [`Converter`] trait; [`Dcm2niix`]
//! runs the `dcm2niix` program.
//!
//! # Example
//!
//! ```no_run
//! use si_convert::{ConvertRequest, Dcm2niix, convert_session};
//! use si_core::{Config, RawFormat, RunContext, SessionId};
//!
//! let ctx = RunContext::new(Config::default());
//! let converter = Dcm2niix::new(ctx.config().convert.clone());
//! let request = ConvertRequest::new(
//!     "/incoming/exam42",
//!     "/data",
//!     SessionId::new("study", "0042", "01"),
//!     RawFormat::Dicom,
//! );
//! let summary = convert_session(&request, &converter, &ctx)?;
//! println!("{} volumes in {}", summary.conversion.converted, summary.dir);
//! # Ok::<(), si_convert::ConvertError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod anonymize;
pub mod converter;
pub mod error;
pub mod input;
pub mod orchestrator;
pub mod outputs;
pub mod provenance;
pub mod record;
pub mod session;
pub mod update;

#[cfg(test)]
mod test_support;

pub use anonymize::{Anonymization, shift_datetime};
pub use converter::{
    Converter, ConverterOutput, Dcm2niix, KeepOrientation, Reorienter, parse_converted_filenames,
};
pub use error::{ConvertError, FailureKind};
pub use input::{ArchiveKind, InputMode, source_files, stage_input};
pub use orchestrator::{ConversionReport, NII_DIR, convert_records};
pub use outputs::{TagSet, expected_tags, match_outputs, output_tags};
pub use provenance::{Provenance, ProvenanceFile};
pub use record::{ScannerDefaults, SessionRecord, TOOL_VERSION, ToolVersions, version_is_current};
pub use session::{
    ConvertRequest, ExistingSession, SessionLayout, SessionSummary, convert_session,
    default_lookup_path,
};
pub use update::{UpdateOutcome, UpdateRequest, find_session_record, update_session};
