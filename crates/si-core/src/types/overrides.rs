//! Operator overrides: the project lookup table and per-session manual names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::name::PartialName;
use crate::digest;
use crate::error::NameParseError;

/// Institution key that matches any institution.
pub const WILDCARD_INSTITUTION: &str = "NONE";

/// An operator decision for one series.
///
/// Serialized as `false` for [`Suppress`](Self::Suppress) and as the dash
/// form for [`Name`](Self::Name). The string `FALSE` also reads as suppress.
///
/// # Examples
///
/// ```
/// use si_core::NameOverride;
///
/// let ov: NameOverride = serde_json::from_str("false").unwrap();
/// assert_eq!(ov, NameOverride::Suppress);
///
/// let ov: NameOverride = serde_json::from_str(r#""SPINE-T2""#).unwrap();
/// assert!(matches!(ov, NameOverride::Name(_)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawOverride", into = "RawOverride")]
pub enum NameOverride {
    /// Do not convert the series.
    Suppress,
    /// Use these fields; unset fields fall through to lower-priority sources.
    Name(PartialName),
}

impl NameOverride {
    /// Parses the text form used in lookup CSV cells.
    ///
    /// # Errors
    ///
    /// Returns [`NameParseError`] if a slot holds an unknown token.
    pub fn parse_cell(text: &str) -> Result<Self, NameParseError> {
        if text.trim().eq_ignore_ascii_case("false") {
            Ok(Self::Suppress)
        } else {
            text.parse().map(Self::Name)
        }
    }

    /// Returns the name, or `None` for [`Suppress`](Self::Suppress).
    #[inline]
    #[must_use]
    pub const fn name(&self) -> Option<&PartialName> {
        match self {
            Self::Suppress => None,
            Self::Name(name) => Some(name),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawOverride {
    Flag(bool),
    Text(String),
}

impl TryFrom<RawOverride> for NameOverride {
    type Error = NameParseError;

    fn try_from(raw: RawOverride) -> Result<Self, Self::Error> {
        match raw {
            RawOverride::Flag(false) => Ok(Self::Suppress),
            RawOverride::Flag(true) => Err(NameParseError::new("name", "true")),
            RawOverride::Text(text) => Self::parse_cell(&text),
        }
    }
}

impl From<NameOverride> for RawOverride {
    fn from(value: NameOverride) -> Self {
        match value {
            NameOverride::Suppress => Self::Flag(false),
            NameOverride::Name(name) => Self::Text(name.to_string()),
        }
    }
}

/// Project lookup table keyed by institution, then series description.
///
/// # Examples
///
/// ```
/// use si_core::{LookupTable, NameOverride};
///
/// let mut table = LookupTable::default();
/// table.insert("NONE", "AX FLAIR", NameOverride::parse_cell("BRAIN-FLAIR").unwrap());
///
/// // Wildcard institution, "WIP " prefix and " SENSE" suffix stripped.
/// assert!(table.check(Some("General Hospital"), "WIP AX FLAIR SENSE").is_some());
/// assert!(table.check(Some("General Hospital"), "AX T1").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupTable {
    entries: BTreeMap<String, BTreeMap<String, NameOverride>>,
}

impl LookupTable {
    /// Adds an entry.
    ///
    /// Returns `false`, leaving the table unchanged, if the key already exists.
    pub fn insert(&mut self, institution: &str, description: &str, value: NameOverride) -> bool {
        let institution = if institution.eq_ignore_ascii_case(WILDCARD_INSTITUTION) {
            WILDCARD_INSTITUTION
        } else {
            institution
        };
        let by_desc = self.entries.entry(institution.to_owned()).or_default();
        if by_desc.contains_key(description) {
            return false;
        }
        by_desc.insert(description.to_owned(), value);
        true
    }

    /// Looks up a series, trying its institution before the wildcard.
    ///
    /// A leading `WIP ` and a trailing ` CLEAR` or ` SENSE` are removed from
    /// the description first.
    #[must_use]
    pub fn check(&self, institution: Option<&str>, description: &str) -> Option<&NameOverride> {
        let stripped = description.strip_prefix("WIP ").unwrap_or(description);
        let desc = stripped
            .strip_suffix(" CLEAR")
            .or_else(|| stripped.strip_suffix(" SENSE"))
            .unwrap_or(stripped);
        institution
            .into_iter()
            .chain(std::iter::once(WILDCARD_INSTITUTION))
            .find_map(|inst| self.entries.get(inst).and_then(|by_desc| by_desc.get(desc)))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the SHA-256 of the table's canonical JSON form.
    ///
    /// Keys are kept sorted, so equal tables always give equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        digest::hash_bytes(&json)
    }

    /// Replaces every institution key except the wildcard with its SHA-256.
    ///
    /// Used when a session is anonymized, so that the recorded table matches
    /// the hashed institutions of its records.
    pub fn hash_institutions(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .map(|(institution, by_desc)| {
                if institution == WILDCARD_INSTITUTION {
                    (institution, by_desc)
                } else {
                    (digest::hash_bytes(institution.as_bytes()), by_desc)
                }
            })
            .collect();
    }
}

/// Per-session manual names keyed by source path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualNames(BTreeMap<String, NameOverride>);

impl ManualNames {
    /// Returns the override for a source path.
    #[must_use]
    pub fn get(&self, source_path: &str) -> Option<&NameOverride> {
        self.0.get(source_path)
    }

    /// Sets the override for a source path.
    pub fn insert(&mut self, source_path: impl Into<String>, value: NameOverride) {
        self.0.insert(source_path.into(), value);
    }

    /// Returns `true` if there are no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
