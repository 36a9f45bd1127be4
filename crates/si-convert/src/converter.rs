//! The external volume converter.
//!
//! The orchestrator only needs three things from a converter: run it on a
//! file group, know which files it wrote, and know its version for the
//! session record. [`Dcm2niix`] does this by spawning the `dcm2niix`
//! program; tests substitute their own [`Converter`].

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use si_core::{ConvertConfig, Orientation};
use tracing::debug;

use crate::error::ConvertError;

/// Result of one converter invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConverterOutput {
    /// Whether the converter reported success.
    pub success: bool,
    /// Combined console output, kept for the log.
    pub report: String,
    /// Written outputs, as paths without extension, in report order.
    pub outputs: Vec<Utf8PathBuf>,
}

/// Brings a written volume into the canonical orientation for its plane.
pub trait Reorienter {
    /// Reorients `volume` in place.
    ///
    /// # Errors
    ///
    /// Returns a message when the volume cannot be reoriented; the output
    /// then fails.
    fn reorient(&self, volume: &Utf8Path, plane: Orientation) -> Result<(), String>;
}

/// Leaves volumes as the converter wrote them.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepOrientation;

impl Reorienter for KeepOrientation {
    fn reorient(&self, _volume: &Utf8Path, _plane: Orientation) -> Result<(), String> {
        Ok(())
    }
}

/// A converter from one raw file group to zero or more volumes.
pub trait Converter {
    /// Converts the files under `files_dir`, writing outputs named from
    /// `base_name` into `output_dir`.
    ///
    /// A converter that ran but failed returns `Ok` with `success` unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Spawn`] if the converter cannot run at all.
    fn convert(
        &self,
        files_dir: &Utf8Path,
        base_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<ConverterOutput, ConvertError>;

    /// Returns the converter version recorded in the session record.
    fn version(&self) -> String;

    /// Returns the hook applied to every accepted output.
    fn reorienter(&self) -> &dyn Reorienter {
        &KeepOrientation
    }
}

/// Extracts output paths from `dcm2niix` console output.
///
/// Every line starting with `Convert ` names one output: the first
/// whitespace-separated token containing a `/`.
///
/// # Examples
///
/// ```
/// use si_convert::parse_converted_filenames;
///
/// let report = "Chris Rorden's dcm2niiX\n\
///               Convert 24 DICOM as /out/nii/P_01-01_BRAIN (256x256x24x1)\n\
///               Conversion required 0.2 seconds.";
/// let outputs = parse_converted_filenames(report);
/// assert_eq!(outputs.len(), 1);
/// assert_eq!(outputs[0].as_str(), "/out/nii/P_01-01_BRAIN");
/// ```
#[must_use]
pub fn parse_converted_filenames(report: &str) -> Vec<Utf8PathBuf> {
    report
        .lines()
        .filter(|line| line.starts_with("Convert "))
        .filter_map(|line| line.split_whitespace().find(|token| token.contains('/')))
        .map(Utf8PathBuf::from)
        .collect()
}

/// The `dcm2niix` subprocess converter.
#[derive(Debug, Clone)]
pub struct Dcm2niix {
    config: ConvertConfig,
}

impl Dcm2niix {
    /// Creates a converter from the run configuration.
    #[inline]
    #[must_use]
    pub const fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    /// Returns the argument list for one invocation.
    fn args(&self, files_dir: &Utf8Path, base_name: &str, output_dir: &Utf8Path) -> Vec<String> {
        let flag = |on: bool| (if on { "y" } else { "n" }).to_owned();
        let mut args = vec![
            "-b".to_owned(),
            flag(self.config.sidecars),
            "-z".to_owned(),
            flag(self.config.compress),
            "-f".to_owned(),
            base_name.to_owned(),
            "-o".to_owned(),
            output_dir.to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(files_dir.to_string());
        args
    }
}

impl Converter for Dcm2niix {
    fn convert(
        &self,
        files_dir: &Utf8Path,
        base_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<ConverterOutput, ConvertError> {
        let args = self.args(files_dir, base_name, output_dir);
        debug!(program = %self.config.program, ?args, "running converter");
        let output = Command::new(&self.config.program)
            .args(&args)
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ConverterOutput {
            success: output.status.success(),
            outputs: parse_converted_filenames(&report),
            report,
        })
    }

    fn version(&self) -> String {
        Command::new(&self.config.program)
            .arg("--version")
            .output()
            .ok()
            .and_then(|output| {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                text.lines()
                    .map(str::trim)
                    .rfind(|line| !line.is_empty())
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| "unknown".to_owned())
    }
}
