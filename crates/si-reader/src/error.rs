//! Error types for the si-reader crate.
//!
//! This module provides the [`ReadError`] type for errors that can occur
//! while reading raw scan headers.

use camino::Utf8PathBuf;

/// Errors that can occur while reading a raw scan file.
///
/// # Error Recovery Strategy
///
/// - **Unreadable or invalid files** ([`ReadError::Dicom`], [`ReadError::Par`],
///   [`ReadError::Unsupported`], [`ReadError::MissingAttribute`]): Log a
///   warning, skip the file, continue
/// - **I/O errors** ([`ReadError::Io`]): Fatal for the file set being read
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file could not be opened or read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path of the file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a parseable DICOM object.
    #[error("failed to parse DICOM file {path}: {message}")]
    Dicom {
        /// The path of the file.
        path: Utf8PathBuf,
        /// Parser message.
        message: String,
    },

    /// The PAR header is malformed.
    #[error("invalid PAR header {path} at line {line}: {message}")]
    Par {
        /// The path of the header.
        path: Utf8PathBuf,
        /// 1-based line number, 0 when the problem is not tied to a line.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// The file parses but is not an MR image this tool converts.
    #[error("unsupported file {path}: {reason}")]
    Unsupported {
        /// The path of the file.
        path: Utf8PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A required attribute is absent.
    #[error("{path} has no {attribute}")]
    MissingAttribute {
        /// The path of the file.
        path: Utf8PathBuf,
        /// Attribute keyword.
        attribute: &'static str,
    },
}

impl ReadError {
    /// Creates a new [`ReadError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ReadError::Dicom`] error.
    #[inline]
    pub fn dicom(path: impl Into<Utf8PathBuf>, message: impl ToString) -> Self {
        Self::Dicom {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new [`ReadError::Par`] error.
    #[inline]
    pub fn par(path: impl Into<Utf8PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Par {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a new [`ReadError::Unsupported`] error.
    #[inline]
    pub fn unsupported(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ReadError::MissingAttribute`] error.
    #[inline]
    pub fn missing(path: impl Into<Utf8PathBuf>, attribute: &'static str) -> Self {
        Self::MissingAttribute {
            path: path.into(),
            attribute,
        }
    }

    /// Returns `true` if the file can be skipped and reading continue.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    /// Returns `true` if this error is fatal.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            Self::Io { path, .. }
            | Self::Dicom { path, .. }
            | Self::Par { path, .. }
            | Self::Unsupported { path, .. }
            | Self::MissingAttribute { path, .. } => path,
        }
    }
}
