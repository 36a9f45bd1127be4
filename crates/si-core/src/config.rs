//! Configuration structures for the seriesid pipeline.
//!
//! - [`SortConfig`] - Raw-file walking and header-read parallelism
//! - [`NamingConfig`] - Coverage and grouping thresholds used while naming
//! - [`ConvertConfig`] - External converter program and flags
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a config file only needs the keys it overrides.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the series sorter.
///
/// # Examples
///
/// ```
/// use si_core::SortConfig;
///
/// let config = SortConfig::default();
/// assert!(!config.follow_links);
/// assert_eq!(config.max_parallel_jobs, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Whether to follow symbolic links while walking the raw directory.
    pub follow_links: bool,

    /// Maximum number of parallel header-read jobs.
    /// `None` means use all available CPU cores.
    pub max_parallel_jobs: Option<usize>,
}

/// Thresholds used by the classifier, the study numbering and the resolver.
///
/// # Examples
///
/// ```
/// use si_core::NamingConfig;
///
/// let config = NamingConfig::default();
/// assert_eq!(config.min_brain_slices, 10);
/// assert_eq!(config.study_gap_secs, 1800);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Brain T1/T2/T2STAR/FLAIR series with fewer files are excluded.
    pub min_brain_slices: u32,

    /// ORBITS series covering more than this (mm) are renamed BRAIN.
    pub orbit_max_coverage_mm: f64,

    /// Sagittal BRAIN series covering less than this (mm) are renamed SPINE.
    pub brain_min_coverage_mm: f64,

    /// Gap (mm) between consecutive spine stations that advances the level.
    pub spine_gap_mm: f64,

    /// Time gap (seconds) between acquisitions that starts a new study block.
    pub study_gap_secs: i64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            min_brain_slices: 10,
            orbit_max_coverage_mm: 120.0,
            brain_min_coverage_mm: 100.0,
            spine_gap_mm: 100.0,
            study_gap_secs: 1800,
        }
    }
}

/// Configuration for the external converter.
///
/// # Examples
///
/// ```
/// use si_core::ConvertConfig;
///
/// let config = ConvertConfig::default();
/// assert_eq!(config.program, "dcm2niix");
/// assert!(config.compress);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Converter executable, resolved through `PATH` when not absolute.
    pub program: String,

    /// Emit gzip-compressed volumes (`-z y`).
    pub compress: bool,

    /// Emit JSON sidecars (`-b y`).
    pub sidecars: bool,

    /// Extra arguments inserted before the source directory.
    pub extra_args: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            program: "dcm2niix".to_owned(),
            compress: true,
            sidecars: true,
            extra_args: Vec::new(),
        }
    }
}

impl ConvertConfig {
    /// Returns the file extension of converted volumes.
    #[inline]
    #[must_use]
    pub const fn volume_extension(&self) -> &'static str {
        if self.compress { ".nii.gz" } else { ".nii" }
    }
}

/// Root configuration for the seriesid tool.
///
/// # Examples
///
/// ```
/// use si_core::Config;
///
/// let config = Config::default();
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// assert!(json.contains("dcm2niix"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sorter configuration.
    pub sort: SortConfig,

    /// Naming thresholds.
    pub naming: NamingConfig,

    /// Converter configuration.
    pub convert: ConvertConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `path` does not exist,
    /// [`ConfigError::Parse`] if the content is not valid JSON for this
    /// structure, or [`ConfigError::InvalidOption`] if a threshold is out of
    /// range.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_owned()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("naming.orbit_max_coverage_mm", self.naming.orbit_max_coverage_mm),
            ("naming.brain_min_coverage_mm", self.naming.brain_min_coverage_mm),
            ("naming.spine_gap_mm", self.naming.spine_gap_mm),
        ];
        for (option, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidOption {
                    option: option.to_owned(),
                    reason: format!("must be a positive number, got {value}"),
                });
            }
        }
        if self.naming.study_gap_secs <= 0 {
            return Err(ConfigError::InvalidOption {
                option: "naming.study_gap_secs".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        if self.sort.max_parallel_jobs == Some(0) {
            return Err(ConfigError::InvalidOption {
                option: "sort.max_parallel_jobs".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.convert.program.trim().is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "convert.program".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_config_defaults() {
        let config = NamingConfig::default();
        assert_eq!(config.min_brain_slices, 10);
        assert!((config.orbit_max_coverage_mm - 120.0).abs() < f64::EPSILON);
        assert!((config.brain_min_coverage_mm - 100.0).abs() < f64::EPSILON);
        assert!((config.spine_gap_mm - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.study_gap_secs, 1800);
    }

    #[test]
    fn test_convert_config_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.program, "dcm2niix");
        assert!(config.compress);
        assert!(config.sidecars);
        assert!(config.extra_args.is_empty());
        assert_eq!(config.volume_extension(), ".nii.gz");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"naming": {"spine_gap_mm": 80.0}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!((config.naming.spine_gap_mm - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.naming.study_gap_secs, 1800);
        assert_eq!(config.convert.program, "dcm2niix");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("nope.json")).unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::MissingFile(_))
        ));
    }

    #[test]
    fn test_from_file_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("config.json")).unwrap();
        std::fs::write(&path, r#"{"naming": {"spine_gap_mm": -1.0}}"#).unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("naming.spine_gap_mm"));
    }

    #[test]
    fn test_from_file_reads_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("config.json")).unwrap();
        std::fs::write(&path, r#"{"convert": {"program": "/opt/bin/dcm2niix"}}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.convert.program, "/opt/bin/dcm2niix");
    }
}
