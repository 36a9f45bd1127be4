//! The persisted session record and the per-output sidecars.
//!
//! The session record (`{prefix}_UnconvertedInfo.json`) holds everything
//! needed to rerun naming without the original source: the input hash, the
//! overrides in force, and every [`ScanRecord`] with its outcome. An update
//! compares it against the current tool version and overrides to decide
//! whether anything needs to be redone.

use std::io;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use si_core::{LookupTable, ManualNames, ScanRecord, Session};
use tracing::debug;

use crate::error::ConvertError;

/// Version of this tool, as recorded in session records.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Versions of the programs that produced a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersions {
    /// This tool.
    pub seriesid: String,
    /// The external converter.
    pub converter: String,
}

impl ToolVersions {
    /// Returns the current tool version with the given converter version.
    #[must_use]
    pub fn current(converter: impl Into<String>) -> Self {
        Self {
            seriesid: TOOL_VERSION.to_owned(),
            converter: converter.into(),
        }
    }
}

/// Scanner attributes supplied by the operator for formats that lack them.
///
/// PAR headers carry neither institution nor field strength.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerDefaults {
    /// Institution name.
    pub institution: Option<String>,
    /// Main field strength in tesla.
    pub field_strength: Option<f64>,
}

impl ScannerDefaults {
    /// Fills attributes the record does not already have.
    pub fn apply(&self, record: &mut ScanRecord) {
        if record.institution.is_none() {
            record.institution.clone_from(&self.institution);
        }
        if record.field_strength.is_none() {
            record.field_strength = self.field_strength;
        }
    }
}

/// Contents of `{prefix}_UnconvertedInfo.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Programs that produced the session.
    pub versions: ToolVersions,
    /// Whether the session lives under a per-project directory.
    pub project_subdir: bool,
    /// Operator-supplied scanner attributes.
    #[serde(default)]
    pub scanner: ScannerDefaults,
    /// Fingerprint of the lookup table in force.
    pub lookup_fingerprint: String,
    /// Identifiers were replaced and the raw data removed.
    #[serde(default)]
    pub anonymized: bool,
    /// Identity, input hash, overrides and records.
    pub session: Session,
}

#[derive(Serialize)]
struct OutputSidecar<'a> {
    versions: &'a ToolVersions,
    session: &'a si_core::SessionId,
    input_hash: &'a str,
    lookup_fingerprint: &'a str,
    record: &'a ScanRecord,
}

/// Returns `true` if a session made by `saved` needs no rerun under
/// `current`.
///
/// Development builds never count as current. Otherwise `saved` must be at
/// least `current`, comparing numeric components in order.
///
/// # Examples
///
/// ```
/// use si_convert::version_is_current;
///
/// assert!(version_is_current("1.4.0", "1.4.0"));
/// assert!(version_is_current("1.10.0", "1.9.2"));
/// assert!(!version_is_current("1.3.9", "1.4.0"));
/// assert!(!version_is_current("1.4.0-dev", "1.4.0"));
/// ```
#[must_use]
pub fn version_is_current(saved: &str, current: &str) -> bool {
    if saved.contains("dev") || current.contains("dev") {
        return false;
    }
    let parse = |version: &str| -> Option<Vec<u64>> {
        version
            .split('-')
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|part| part.parse().ok())
            .collect()
    };
    match (parse(saved), parse(current)) {
        (Some(saved), Some(current)) => saved >= current,
        _ => false,
    }
}

impl SessionRecord {
    /// Creates a record for `session`.
    #[must_use]
    pub fn new(
        session: Session,
        converter_version: impl Into<String>,
        project_subdir: bool,
        scanner: ScannerDefaults,
    ) -> Self {
        Self {
            versions: ToolVersions::current(converter_version),
            project_subdir,
            scanner,
            lookup_fingerprint: session.lookup.fingerprint(),
            anonymized: false,
            session,
        }
    }

    /// Reads a record from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::MissingRecord`] if the file does not exist,
    /// [`ConvertError::Io`] if it cannot be read and [`ConvertError::Json`]
    /// if it is not a session record.
    pub fn read(path: &Utf8Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ConvertError::MissingRecord(path.to_owned())
            } else {
                ConvertError::io("read", path, err)
            }
        })?;
        serde_json::from_str(&text).map_err(|err| ConvertError::json(path, err))
    }

    /// Writes the record as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if the file cannot be written.
    pub fn write(&self, path: &Utf8Path) -> Result<(), ConvertError> {
        let json = serde_json::to_string_pretty(self).map_err(|err| ConvertError::json(path, err))?;
        std::fs::write(path, json).map_err(|err| ConvertError::io("write", path, err))?;
        debug!(path = %path, "session record written");
        Ok(())
    }

    /// Writes `{name}.json` next to every converted volume in `nii_dir`.
    ///
    /// Returns the number of sidecars written.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if a sidecar cannot be written.
    pub fn write_sidecars(&self, nii_dir: &Utf8Path) -> Result<usize, ConvertError> {
        let mut written = 0;
        for record in self.session.records.iter().filter(|r| r.converted) {
            let Some(name) = record.final_name_string() else {
                continue;
            };
            let path = nii_dir.join(format!("{name}.json"));
            let sidecar = OutputSidecar {
                versions: &self.versions,
                session: &self.session.id,
                input_hash: &self.session.input_hash,
                lookup_fingerprint: &self.lookup_fingerprint,
                record,
            };
            let json =
                serde_json::to_string_pretty(&sidecar).map_err(|err| ConvertError::json(&path, err))?;
            std::fs::write(&path, json).map_err(|err| ConvertError::io("write", &path, err))?;
            written += 1;
        }
        Ok(written)
    }

    /// Returns `true` if rerunning with this tool version, `lookup` and
    /// `manual_names` would not change anything.
    #[must_use]
    pub fn is_current(&self, lookup: &LookupTable, manual_names: &ManualNames) -> bool {
        version_is_current(&self.versions.seriesid, TOOL_VERSION)
            && self.session.lookup == *lookup
            && self.session.manual_names == *manual_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{named_record, root};
    use si_core::{NameOverride, RawFormat, SessionId};
    use tempfile::TempDir;

    fn session() -> Session {
        let mut session = Session::new(SessionId::new("p", "0001", "01"), RawFormat::Dicom, "abc");
        let mut converted = named_record("1.01", "dcm/1", "P-0001_01_01-01_BRAIN-T1-SE-2D-AXIAL-PRE");
        converted.converted = true;
        converted.output_hash = Some("f00d".to_owned());
        session.records.push(converted);
        session
            .records
            .push(named_record("2.01", "dcm/2", "P-0001_01_01-02_BRAIN-T2-SE-2D-AXIAL-PRE"));
        session
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = root(&dir).join("P-0001_01_UnconvertedInfo.json");
        let record = SessionRecord::new(
            session(),
            "v1.0.20240202",
            true,
            ScannerDefaults {
                institution: Some("General Hospital".to_owned()),
                ..ScannerDefaults::default()
            },
        );
        record.write(&path).unwrap();
        let read = SessionRecord::read(&path).unwrap();
        assert_eq!(read, record);
        assert_eq!(read.versions.converter, "v1.0.20240202");
        assert!(!read.anonymized);
    }

    #[test]
    fn test_anonymized_defaults_to_false() {
        let record = SessionRecord::new(session(), "x", false, ScannerDefaults::default());
        let mut value = serde_json::to_value(&record).unwrap();
        value.as_object_mut().unwrap().remove("anonymized");
        let read: SessionRecord = serde_json::from_value(value).unwrap();
        assert!(!read.anonymized);
    }

    #[test]
    fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        let path = root(&dir).join("none.json");
        assert!(matches!(
            SessionRecord::read(&path),
            Err(ConvertError::MissingRecord(_))
        ));
    }

    #[test]
    fn test_sidecars_only_for_converted() {
        let dir = TempDir::new().unwrap();
        let nii = root(&dir);
        let record = SessionRecord::new(session(), "x", false, ScannerDefaults::default());
        assert_eq!(record.write_sidecars(&nii).unwrap(), 1);
        let text =
            std::fs::read_to_string(nii.join("P-0001_01_01-01_BRAIN-T1-SE-2D-AXIAL-PRE.json"))
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["input_hash"], "abc");
        assert_eq!(value["record"]["output_hash"], "f00d");
    }

    #[test]
    fn test_is_current() {
        let record = SessionRecord::new(session(), "x", false, ScannerDefaults::default());
        let mut manual = ManualNames::default();
        assert!(record.is_current(&LookupTable::default(), &manual));

        manual.insert("dcm/1", NameOverride::Suppress);
        assert!(!record.is_current(&LookupTable::default(), &manual));

        let mut lookup = LookupTable::default();
        lookup.insert("NONE", "AX T1", NameOverride::Suppress);
        assert!(!record.is_current(&lookup, &ManualNames::default()));
    }

    #[test]
    fn test_scanner_defaults_fill_gaps() {
        let defaults = ScannerDefaults {
            institution: Some("General Hospital".to_owned()),
            field_strength: Some(3.0),
        };
        let mut record = ScanRecord {
            field_strength: Some(1.5),
            ..ScanRecord::default()
        };
        defaults.apply(&mut record);
        assert_eq!(record.institution.as_deref(), Some("General Hospital"));
        assert_eq!(record.field_strength, Some(1.5));
    }
}
