//! Fixtures shared by the conversion tests.

use std::cell::RefCell;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use si_core::{Orientation, ScanRecord};
use tempfile::TempDir;

use crate::converter::{Converter, ConverterOutput, Reorienter, parse_converted_filenames};
use crate::error::ConvertError;

pub fn root(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

pub fn named_record(uid: &str, source: &str, name: &str) -> ScanRecord {
    ScanRecord {
        final_name: Some(name.parse().unwrap()),
        ..ScanRecord::new(uid, "1.2", source)
    }
}

/// Writes `{base}{suffix}.nii.gz` plus a sidecar per suffix, like `dcm2niix`.
pub struct FakeConverter {
    pub suffixes: Vec<String>,
    /// Files written as `{base}{extra}` but not reported.
    pub extra_files: Vec<String>,
    /// Base name for which the converter reports failure.
    pub fail_on: Option<String>,
    pub fail_all: bool,
    pub reorient_fails: bool,
    pub calls: RefCell<Vec<(Utf8PathBuf, String)>>,
}

impl Default for FakeConverter {
    fn default() -> Self {
        Self {
            suffixes: vec![String::new()],
            extra_files: Vec::new(),
            fail_on: None,
            fail_all: false,
            reorient_fails: false,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl FakeConverter {
    pub fn calls(&self) -> Vec<(Utf8PathBuf, String)> {
        self.calls.borrow().clone()
    }
}

impl Converter for FakeConverter {
    fn convert(
        &self,
        files_dir: &Utf8Path,
        base_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<ConverterOutput, ConvertError> {
        self.calls
            .borrow_mut()
            .push((files_dir.to_owned(), base_name.to_owned()));
        let mut report = String::new();
        for suffix in &self.suffixes {
            let stem = output_dir.join(format!("{base_name}{suffix}"));
            fs::write(format!("{stem}.nii.gz"), format!("{base_name}{suffix}")).unwrap();
            fs::write(format!("{stem}.json"), r#"{"EchoTime": 0.01}"#).unwrap();
            report.push_str(&format!("Convert 10 DICOM as {stem} (64x64x10x1)\n"));
        }
        for extra in &self.extra_files {
            fs::write(output_dir.join(format!("{base_name}{extra}")), b"extra").unwrap();
        }
        let failed = self.fail_all || self.fail_on.as_deref() == Some(base_name);
        Ok(ConverterOutput {
            success: !failed,
            outputs: parse_converted_filenames(&report),
            report,
        })
    }

    fn version(&self) -> String {
        "fake-1.0".to_owned()
    }

    fn reorienter(&self) -> &dyn Reorienter {
        self
    }
}

impl Reorienter for FakeConverter {
    fn reorient(&self, volume: &Utf8Path, _plane: Orientation) -> Result<(), String> {
        if self.reorient_fails {
            return Err(format!("cannot reorient {volume}"));
        }
        Ok(())
    }
}

/// A PAR header with `slices` image rows.
pub fn par_text(protocol: &str, slices: usize) -> String {
    let mut text = String::from("# === GENERAL INFORMATION ===\n");
    text.push_str(".    Examination name                   :   BRAIN ROUTINE\n");
    text.push_str(&format!(".    Protocol name                      :   {protocol}\n"));
    text.push_str(".    Examination date/time              :   2023.11.02 / 14:05:09\n");
    text.push_str(".    Acquisition nr                     :   5\n");
    text.push_str(".    Reconstruction nr                  :   1\n");
    text.push_str(&format!(".    Max. number of slices/locations    :   {slices}\n"));
    text.push_str(".    Technique                          :   T1TFE\n");
    text.push_str(".    Scan resolution  (x, y)            :   240  240\n");
    text.push_str(".    Scan mode                          :   3D\n");
    text.push_str(".    Repetition time [ms]               :   8.100\n");
    text.push_str(".    Angulation midslice(ap,fh,rl)[degr]:   0.000  0.000  0.000\n");
    text.push_str(".    Off Centre midslice(ap,fh,rl) [mm] :   1.000  20.000  -3.000\n");
    text.push_str("# === IMAGE INFORMATION ===\n");
    for slice in 1..=slices {
        text.push_str(&format!(
            "{slice} 1 1 1 0 2 {idx} 16 100 256 256 0 1 1 100 200 \
             0 0 0 0 0 0 1.000 0.000 0 2 0 0 0.938 0.938 3.70 0 0 0 1 8.00 \
             0 0 0 180 900.0 1 1 0 0 0 0 0 0 -\n",
            idx = slice - 1
        ));
    }
    text
}

/// Stem of the PAR/REC pair written by [`par_source`].
pub const PAR_STEM: &str = "2.25.77.5.1";

/// Name given to the [`par_source`] series by [`write_manual_names`].
pub const PAR_TAIL: &str = "BRAIN-T1-IRFSPGR-3D-SAGITTAL-PRE";

/// Writes a source directory holding one PAR/REC pair under a subfolder.
pub fn par_source(root: &Utf8Path) -> Utf8PathBuf {
    let source = root.join("source");
    fs::create_dir_all(source.join("exam")).unwrap();
    fs::write(
        source.join(format!("exam/{PAR_STEM}.PAR")),
        par_text("T1W_3D_TFE", 3),
    )
    .unwrap();
    fs::write(source.join(format!("exam/{PAR_STEM}.REC")), b"voxels").unwrap();
    source
}

/// Writes a manual naming file that names the [`par_source`] series.
pub fn write_manual_names(path: &Utf8Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut map = serde_json::Map::new();
    map.insert(format!("parrec/{PAR_STEM}.par"), value);
    fs::write(path, serde_json::Value::Object(map).to_string()).unwrap();
}
