//! Per-session manual name overrides.

use std::fs;
use std::io::ErrorKind;

use camino::Utf8Path;
use si_core::ManualNames;
use tracing::debug;

use crate::error::NamingError;

/// Loads the manual naming file, or an empty set if it does not exist.
///
/// The file is a JSON object mapping a record's source path to a dash name
/// or `false`:
///
/// ```json
/// { "dcm/1.2.840.1.4.01": "SPINE-T2", "dcm/1.2.840.1.9.01": false }
/// ```
///
/// # Errors
///
/// Returns [`NamingError::Io`] if the file exists but cannot be read and
/// [`NamingError::Json`] if it is not a valid override map.
pub fn load_manual_names(path: &Utf8Path) -> Result<ManualNames, NamingError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ManualNames::default()),
        Err(e) => return Err(NamingError::io(path, e)),
    };
    let names = serde_json::from_str(&text).map_err(|source| NamingError::Json {
        path: path.to_owned(),
        source,
    })?;
    debug!(path = %path, "loaded manual names");
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use si_core::NameOverride;
    use tempfile::TempDir;

    #[test]
    fn test_absent_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("none.json")).unwrap();
        assert!(load_manual_names(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_and_reject() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("m.json")).unwrap();
        fs::write(&path, r#"{"dcm/1.2.3.01": false}"#).unwrap();
        let names = load_manual_names(&path).unwrap();
        assert_eq!(names.get("dcm/1.2.3.01"), Some(&NameOverride::Suppress));

        fs::write(&path, r#"{"dcm/1.2.3.01": "BRAIN-T7"}"#).unwrap();
        assert!(matches!(
            load_manual_names(&path).unwrap_err(),
            NamingError::Json { .. }
        ));
    }
}
