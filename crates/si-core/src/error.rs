//! Error types for the si-core crate.
//!
//! This module provides [`ConfigError`] for configuration loading failures and
//! [`NameParseError`] for rejected name tokens. Both are shared across the
//! workspace.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use si_core::ConfigError;
/// use camino::Utf8PathBuf;
///
/// let error = ConfigError::MissingFile(Utf8PathBuf::from("/etc/seriesid.json"));
/// assert!(error.to_string().contains("/etc/seriesid.json"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    MissingFile(Utf8PathBuf),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A name token that does not belong to the expected vocabulary.
///
/// Returned when parsing one of the six name fields, a name suffix, or a full
/// series name from text (lookup tables, manual overrides, persisted records).
///
/// # Examples
///
/// ```
/// use si_core::{BodyPart, NameParseError};
///
/// let err = "KNEE".parse::<BodyPart>().unwrap_err();
/// assert_eq!(err.field(), "body part");
/// assert_eq!(err.token(), "KNEE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} '{token}'")]
pub struct NameParseError {
    field: &'static str,
    token: String,
}

impl NameParseError {
    /// Creates a new error for `token` rejected as a `field`.
    #[inline]
    pub fn new(field: &'static str, token: impl Into<String>) -> Self {
        Self {
            field,
            token: token.into(),
        }
    }

    /// Returns the kind of value that was being parsed.
    #[inline]
    #[must_use]
    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Returns the rejected token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}
