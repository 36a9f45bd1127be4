//! Session identity and the set of records converted together.

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::overrides::{LookupTable, ManualNames};
use super::record::ScanRecord;

/// Identifies one imaging session of one subject.
///
/// Identifiers are stored upper-case.
///
/// # Examples
///
/// ```
/// use si_core::SessionId;
///
/// let id = SessionId::new("study", "0042", "01").with_site("siteA").with_attempt(Some(2));
/// assert_eq!(id.prefix(), "STUDY-SITEA-0042_01");
/// assert_eq!(id.relative_dir(true).as_str(), "study/STUDY-SITEA-0042/01-2");
/// assert_eq!(id.provenance_file_name(), "STUDY-SITEA-0042_01-2_Provenance.yml");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    /// Project identifier.
    pub project: String,
    /// Optional site identifier.
    pub site: Option<String>,
    /// Subject identifier.
    pub subject: String,
    /// Session identifier.
    pub session: String,
    /// Attempt number when the same session was converted more than once.
    pub attempt: Option<u32>,
}

impl SessionId {
    /// Creates an identity without site or attempt.
    #[must_use]
    pub fn new(project: &str, subject: &str, session: &str) -> Self {
        Self {
            project: project.to_uppercase(),
            site: None,
            subject: subject.to_uppercase(),
            session: session.to_uppercase(),
            attempt: None,
        }
    }

    /// Sets the site.
    #[must_use]
    pub fn with_site(mut self, site: &str) -> Self {
        self.site = Some(site.to_uppercase());
        self
    }

    /// Sets or clears the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: Option<u32>) -> Self {
        self.attempt = attempt;
        self
    }

    /// Returns `{PROJECT}-[{SITE}-]{SUBJECT}`.
    #[must_use]
    pub fn subject_label(&self) -> String {
        match &self.site {
            Some(site) => format!("{}-{}-{}", self.project, site, self.subject),
            None => format!("{}-{}", self.project, self.subject),
        }
    }

    /// Returns `{SESSION}[-{attempt}]`.
    #[must_use]
    pub fn session_label(&self) -> String {
        match self.attempt {
            Some(attempt) => format!("{}-{attempt}", self.session),
            None => self.session.clone(),
        }
    }

    /// Returns the name prefix `{PROJECT}-[{SITE}-]{SUBJECT}_{SESSION}`.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("{}_{}", self.subject_label(), self.session)
    }

    /// Returns the session directory relative to the output root.
    ///
    /// With `project_subdir`, the path starts with the lower-case project.
    #[must_use]
    pub fn relative_dir(&self, project_subdir: bool) -> Utf8PathBuf {
        let mut dir = Utf8PathBuf::new();
        if project_subdir {
            dir.push(self.project.to_lowercase());
        }
        dir.push(self.subject_label());
        dir.push(self.session_label());
        dir
    }

    /// Returns the session-level provenance log file name.
    #[must_use]
    pub fn provenance_file_name(&self) -> String {
        format!(
            "{}_{}_Provenance.yml",
            self.subject_label(),
            self.session_label()
        )
    }

    /// Returns the session record file name.
    #[must_use]
    pub fn record_file_name(&self) -> String {
        format!("{}_UnconvertedInfo.json", self.prefix())
    }

    /// Returns the manual naming file name.
    #[must_use]
    pub fn manual_names_file_name(&self) -> String {
        format!("{}_ManualNaming.json", self.prefix())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// Raw data format of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    /// DICOM files, sorted under `dcm/`.
    Dicom,
    /// PAR/REC pairs, sorted under `parrec/`.
    ParRec,
}

impl RawFormat {
    /// Returns the raw data directory name inside a session.
    #[inline]
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Dicom => "dcm",
            Self::ParRec => "parrec",
        }
    }
}

/// Every record from one source input plus the context used to name them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identity.
    pub id: SessionId,
    /// Raw data format.
    pub format: RawFormat,
    /// Order- and name-independent hash of the raw input.
    pub input_hash: String,
    /// Project lookup table.
    pub lookup: LookupTable,
    /// Manual overrides.
    pub manual_names: ManualNames,
    /// Records, in resolver order once naming has run.
    pub records: Vec<ScanRecord>,
}

impl Session {
    /// Creates a session with no records.
    #[must_use]
    pub fn new(id: SessionId, format: RawFormat, input_hash: impl Into<String>) -> Self {
        Self {
            id,
            format,
            input_hash: input_hash.into(),
            lookup: LookupTable::default(),
            manual_names: ManualNames::default(),
            records: Vec::new(),
        }
    }

    /// Returns the records that will be converted.
    pub fn convertible(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.iter().filter(|record| record.convert_image())
    }
}
