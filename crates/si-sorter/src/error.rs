//! Error types for the si-sorter crate.

use camino::Utf8PathBuf;
use si_reader::ReadError;

/// Errors that can occur while sorting a raw directory or loading records.
///
/// # Error Recovery Strategy
///
/// - **Walker errors** ([`SortError::Walk`]): Fatal - propagate immediately
/// - **Filesystem errors** ([`SortError::Io`]): Fatal - the directory may be
///   half-sorted and the session must be rolled back
/// - **No valid input** ([`SortError::NoValidFiles`]): Fatal for the session
/// - **Header errors** ([`SortError::Read`]): Fatal when raised while loading
///   records from an already sorted directory; per-file read failures during
///   sorting are collected into the [`SortReport`](crate::SortReport) instead
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Failed to walk a directory.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// The path involved.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a header failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The directory held no file belonging to a supported series.
    #[error("no valid series found in {0}")]
    NoValidFiles(Utf8PathBuf),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl SortError {
    /// Creates a new [`SortError::Io`] error.
    #[inline]
    pub fn io(action: &'static str, path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the directory contained nothing usable.
    #[inline]
    #[must_use]
    pub const fn is_empty_input(&self) -> bool {
        matches!(self, Self::NoValidFiles(_))
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NoValidFiles(path) => Some(path),
            Self::Read(err) => Some(err.path()),
            Self::Walk(_) | Self::NonUtf8Path(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_sort_error_io() {
        let err = SortError::io(
            "rename",
            "dcm/a",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.path().map(|p| p.as_str()), Some("dcm/a"));
        assert!(err.to_string().starts_with("failed to rename dcm/a"));
    }

    #[test]
    fn test_sort_error_no_valid_files() {
        let err = SortError::NoValidFiles("raw".into());
        assert!(err.is_empty_input());
        assert_eq!(err.to_string(), "no valid series found in raw");
    }

    #[test]
    fn test_sort_error_from_read() {
        let err: SortError = ReadError::missing("x.dcm", "SeriesInstanceUID").into();
        assert_eq!(err.path().map(|p| p.as_str()), Some("x.dcm"));
        assert!(!err.is_empty_input());
    }
}
