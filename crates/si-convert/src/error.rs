//! Error types for the si-convert crate.

use camino::Utf8PathBuf;
use si_naming::NamingError;
use si_sorter::SortError;

/// What a failed run left behind in the session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The run stopped before writing, or removed everything it wrote.
    NothingWritten,
    /// A rerun failed and the previous output was restored.
    RolledBack,
    /// A rerun failed and restoring the previous output failed too.
    RollbackFailed,
}

/// Errors that can end a conversion or update run.
///
/// Per-group converter problems are not errors: they are recorded on the
/// affected [`ScanRecord`](si_core::ScanRecord)s and the run continues with
/// the next group.
///
/// # Error Recovery Strategy
///
/// - **Setup errors** ([`ConvertError::SessionExists`],
///   [`ConvertError::MissingRecord`], [`ConvertError::InputChanged`],
///   [`ConvertError::UnsupportedSource`], [`ConvertError::Anonymized`]):
///   Fatal - nothing has been written yet
/// - **Stage errors** ([`ConvertError::Sort`], [`ConvertError::Naming`],
///   [`ConvertError::NoSeries`], [`ConvertError::NothingConverted`]):
///   Fatal - a fresh run removes what it created, a rerun rolls back
/// - **Filesystem errors** ([`ConvertError::Io`], [`ConvertError::Json`]):
///   Fatal, handled like stage errors
/// - **Converter errors** ([`ConvertError::Spawn`]): Fatal - the converter
///   program is missing or not executable
/// - **Rollback outcomes** ([`ConvertError::RolledBack`],
///   [`ConvertError::RollbackFailed`]): Reported to the operator; after a
///   failed rollback the previous output is left under `prev/`
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
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

    /// A session record or converter sidecar is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// The file involved.
        path: Utf8PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Sorting or loading the raw directory failed.
    #[error(transparent)]
    Sort(#[from] SortError),

    /// Loading overrides or naming failed.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// The converter program could not be started.
    #[error("failed to run converter '{program}': {source}")]
    Spawn {
        /// The converter program.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The raw data directory of the session already exists.
    #[error("session output exists at {0}; rerun with --safe, --force or --reckless")]
    SessionExists(Utf8PathBuf),

    /// No session record was found where one is required.
    #[error("session record not found: {0}")]
    MissingRecord(Utf8PathBuf),

    /// The source content differs from the one recorded for the session.
    #[error("source has changed since the last conversion (recorded {recorded}, found {found}); use --reckless to ignore")]
    InputChanged {
        /// Input hash stored in the session record.
        recorded: String,
        /// Input hash of the current source.
        found: String,
    },

    /// The source is neither a directory nor a supported archive.
    #[error("source is not a directory or a .zip, .tar, .tar.gz or .tgz archive: {0}")]
    UnsupportedSource(Utf8PathBuf),

    /// The session was anonymized, so its raw data is gone.
    #[error("session at {0} was anonymized and cannot be rerun")]
    Anonymized(Utf8PathBuf),

    /// The sorted raw directory held no series.
    #[error("no series found in {0}")]
    NoSeries(Utf8PathBuf),

    /// Every converter group of the session failed.
    #[error("conversion failed for all {groups} series groups")]
    NothingConverted {
        /// Number of groups attempted.
        groups: usize,
    },

    /// A rerun failed and the previous output was restored.
    #[error("update failed and previous output was restored: {0}")]
    RolledBack(#[source] Box<ConvertError>),

    /// A rerun failed and the previous output could not be restored.
    #[error("update failed ({cause}) and restoring previous output failed: {restore}")]
    RollbackFailed {
        /// Why the rerun failed.
        cause: Box<ConvertError>,
        /// Why the restore failed.
        #[source]
        restore: Box<ConvertError>,
    },
}

impl ConvertError {
    /// Creates a new [`ConvertError::Io`] error.
    #[inline]
    pub fn io(action: &'static str, path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ConvertError::Json`] error.
    #[inline]
    pub fn json(path: impl Into<Utf8PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Returns what the failed run left behind.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::RolledBack(_) => FailureKind::RolledBack,
            Self::RollbackFailed { .. } => FailureKind::RollbackFailed,
            _ => FailureKind::NothingWritten,
        }
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::Json { path, .. }
            | Self::SessionExists(path)
            | Self::MissingRecord(path)
            | Self::UnsupportedSource(path)
            | Self::Anonymized(path)
            | Self::NoSeries(path) => Some(path),
            Self::Sort(err) => err.path(),
            Self::RolledBack(cause) | Self::RollbackFailed { cause, .. } => cause.path(),
            Self::Naming(_)
            | Self::Spawn { .. }
            | Self::InputChanged { .. }
            | Self::NothingConverted { .. } => None,
        }
    }
}
