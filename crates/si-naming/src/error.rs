//! Error types for the si-naming crate.

use camino::Utf8PathBuf;
use si_core::NameParseError;

/// Errors that can occur while preparing or running the naming stage.
///
/// Classification problems for a single series are not errors: they become
/// an [`ExclusionReason`](si_core::ExclusionReason) on the record. These
/// variants cover the inputs shared by the whole session.
///
/// # Error Recovery Strategy
///
/// - **Pattern errors** ([`NamingError::Pattern`]): Fatal - a built-in
///   pattern failed to compile
/// - **Override files** ([`NamingError::Io`], [`NamingError::Csv`],
///   [`NamingError::Json`], [`NamingError::MissingColumn`]): Fatal - the
///   operator must fix the file
/// - **Override content** ([`NamingError::DuplicateLookup`],
///   [`NamingError::InvalidName`]): Fatal - naming with a half-read table
///   would silently change names
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    /// A built-in pattern failed to compile.
    #[error("failed to compile pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern source.
        pattern: &'static str,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Reading or creating an override file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The file involved.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The lookup table is not valid CSV.
    #[error("failed to read lookup table {path}: {source}")]
    Csv {
        /// The lookup table path.
        path: Utf8PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The lookup table lacks a required column.
    #[error("lookup table {path} has no '{column}' column")]
    MissingColumn {
        /// The lookup table path.
        path: Utf8PathBuf,
        /// The missing column header.
        column: &'static str,
    },

    /// Two lookup rows share an institution and description.
    #[error("lookup table {path} repeats '{description}' for institution '{institution}'")]
    DuplicateLookup {
        /// The lookup table path.
        path: Utf8PathBuf,
        /// Institution key.
        institution: String,
        /// Series description key.
        description: String,
    },

    /// An override holds an unknown name token.
    #[error("invalid name in {path} (row {row}): {source}")]
    InvalidName {
        /// The override file.
        path: Utf8PathBuf,
        /// 1-based data row; 0 for JSON files.
        row: usize,
        /// The rejected token.
        #[source]
        source: NameParseError,
    },

    /// The manual naming file is not valid JSON.
    #[error("failed to parse manual names {path}: {source}")]
    Json {
        /// The manual naming file.
        path: Utf8PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl NamingError {
    /// Creates a new [`NamingError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`NamingError::Csv`] error.
    #[inline]
    pub fn csv(path: impl Into<Utf8PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Returns the override file associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Pattern { .. } => None,
            Self::Io { path, .. }
            | Self::Csv { path, .. }
            | Self::MissingColumn { path, .. }
            | Self::DuplicateLookup { path, .. }
            | Self::InvalidName { path, .. }
            | Self::Json { path, .. } => Some(path),
        }
    }
}
