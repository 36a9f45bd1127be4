//! Format readers for the seriesid pipeline.
//!
//! This crate turns raw scan headers into [`si_core::ScanRecord`]s:
//!
//! - [`read_dicom`]: classic and Enhanced MR DICOM files, returning one
//!   flattened [`Header`] per frame
//! - [`dicom_record`] / [`dicom_fingerprint`]: record and sub-series identity
//!   from a flattened header, including vendor private attributes
//! - [`read_par`]: PAR headers of PAR/REC pairs
//! - [`is_duplicate`]: instance comparison used by deduplication
//!
//! Pixel data is never decoded; only its bytes are compared.
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use si_reader::{dicom_record, read_dicom};
//!
//! let file = read_dicom(Utf8Path::new("dcm/1.2.3/0001.dcm"))?;
//! let record = dicom_record(&file.frames[0], &file.series_uid, Utf8Path::new("1.2.3"), 1, false);
//! println!("{} {}", record.series_uid, record.series_description);
//! # Ok::<(), si_reader::ReadError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod dcm;
pub mod error;
pub mod header;
pub mod par;
pub mod record;

pub use dcm::{
    DicomFile, ENHANCED_MR_IMAGE_STORAGE, MR_IMAGE_STORAGE, headers_match, is_duplicate,
    read_dicom,
};
pub use error::ReadError;
pub use header::{AttrValues, Header};
pub use par::{ParHeader, read_par};
pub use record::{dicom_fingerprint, dicom_record};
