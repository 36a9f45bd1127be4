//! Conversion of named records, one converter call per raw file group.
//!
//! Records that share a `source_path` came from the same raw files (echoes,
//! complex components or sub-series of one acquisition) and are converted
//! by a single converter call. A group either produces every output it was
//! asked for or fails as a whole and leaves nothing behind; once the outputs
//! are paired with records, each output can still fail on its own.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use si_core::digest::hash_file;
use si_core::{RunContext, ScanRecord, SeriesName};
use si_sorter::list_dir;
use tracing::{debug, info, warn};

use crate::converter::{Converter, Reorienter};
use crate::error::ConvertError;
use crate::outputs::{drop_spurious_outputs, match_outputs, remove_created_files, with_suffix};

/// Output directory for converted volumes, relative to the session.
pub const NII_DIR: &str = "nii";

/// Counts from one conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    /// Groups handed to the converter or rejected before it.
    pub groups: usize,
    /// Groups that failed as a whole.
    pub failed_groups: usize,
    /// Records with a converted volume.
    pub converted: usize,
    /// Convertible records without a volume.
    pub failed: usize,
}

/// Groups record indices by `source_path`, in order of first appearance.
fn group_by_source(records: &[ScanRecord]) -> Vec<(Utf8PathBuf, Vec<usize>)> {
    let mut groups: Vec<(Utf8PathBuf, Vec<usize>)> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match groups.iter_mut().find(|(source, _)| *source == record.source_path) {
            Some((_, members)) => members.push(index),
            None => groups.push((record.source_path.clone(), vec![index])),
        }
    }
    groups
}

fn fail_all(records: &mut [ScanRecord], members: &[usize], message: &str) {
    for &index in members {
        records[index].fail(message);
    }
}

/// Converts every convertible record and records the outcome on it.
///
/// Converted volumes are written to `nii/` under `session_dir` as
/// `{final name}{volume extension}`. `source_path`s are resolved against
/// `session_dir`.
///
/// # Errors
///
/// Returns [`ConvertError::Spawn`] if the converter cannot run and
/// [`ConvertError::Io`] or [`ConvertError::Json`] if the output directory
/// cannot be prepared or inspected. Converter failures and unmatched outputs
/// are recorded on the records instead.
pub fn convert_records(
    records: &mut [ScanRecord],
    session_dir: &Utf8Path,
    converter: &dyn Converter,
    ctx: &RunContext,
) -> Result<ConversionReport, ConvertError> {
    let nii_dir = session_dir.join(NII_DIR);
    std::fs::create_dir_all(&nii_dir)
        .map_err(|err| ConvertError::io("create directory", &nii_dir, err))?;
    let ext = ctx.config().convert.volume_extension();

    let mut report = ConversionReport::default();
    for (source, members) in group_by_source(records) {
        for &index in &members {
            let record = &mut records[index];
            record.converted = false;
            record.output_hash = None;
            record.failure = None;
        }
        let convertible: Vec<usize> = members
            .into_iter()
            .filter(|&i| records[i].convert_image() && records[i].final_name.is_some())
            .collect();
        if convertible.is_empty() {
            debug!(source = %source, "no convertible series in group");
            continue;
        }

        report.groups += 1;
        let group = Group {
            source: session_dir.join(&source),
            nii_dir: &nii_dir,
            ext,
        };
        if group.convert(records, &convertible, converter)? {
            ctx.stats().group_converted();
        } else {
            report.failed_groups += 1;
            ctx.stats().group_failed();
        }
        for &index in &convertible {
            if records[index].converted {
                report.converted += 1;
            } else {
                report.failed += 1;
            }
        }
    }
    info!(
        groups = report.groups,
        converted = report.converted,
        failed = report.failed,
        "conversion complete"
    );
    Ok(report)
}

struct Group<'a> {
    source: Utf8PathBuf,
    nii_dir: &'a Utf8Path,
    ext: &'static str,
}

impl Group<'_> {
    fn volume(&self, stem: &str) -> Utf8PathBuf {
        self.nii_dir.join(format!("{stem}{}", self.ext))
    }

    /// Returns `true` unless the group failed as a whole.
    fn convert(
        &self,
        records: &mut [ScanRecord],
        members: &[usize],
        converter: &dyn Converter,
    ) -> Result<bool, ConvertError> {
        let names: Vec<SeriesName> = members
            .iter()
            .filter_map(|&i| records[i].final_name.clone())
            .collect();
        let rendered: Vec<String> = names.iter().map(ToString::to_string).collect();

        let existing: Vec<&String> = rendered
            .iter()
            .filter(|name| self.volume(name).exists())
            .collect();
        if !existing.is_empty() {
            warn!(source = %self.source, ?existing, "naming collision, outputs already exist");
            let message = format!("naming collision: {} already exists", existing[0]);
            fail_all(records, members, &message);
            return Ok(false);
        }

        let output = converter.convert(&self.source, &rendered[0], self.nii_dir)?;
        if !output.success {
            warn!(source = %self.source, report = %output.report, "converter failed");
            for created in &output.outputs {
                remove_created_files(created)?;
            }
            fail_all(records, members, "converter reported failure");
            return Ok(false);
        }

        let outputs = drop_spurious_outputs(output.outputs, self.ext)?;
        let name_refs: Vec<&SeriesName> = names.iter().collect();
        let matched = match match_outputs(&outputs, &name_refs) {
            Ok(matched) => matched,
            Err(message) => {
                warn!(source = %self.source, %message, report = %output.report, "cannot match converter outputs");
                for created in &outputs {
                    remove_created_files(created)?;
                }
                fail_all(records, members, &message);
                return Ok(false);
            }
        };

        for ((created, &index), name) in matched.iter().zip(members).zip(&rendered) {
            let record = &mut records[index];
            match self.finish_output(created, name, record, converter.reorienter()) {
                Ok(hash) => {
                    info!(output = %self.volume(name), "volume created");
                    record.converted = true;
                    record.output_hash = Some(hash);
                }
                Err(message) => {
                    warn!(series = %record.series_uid, %message, "output failed");
                    record.fail(message);
                    remove_created_files(created)?;
                    remove_created_files(&self.nii_dir.join(name))?;
                }
            }
        }
        Ok(true)
    }

    /// Checks, reorients and renames one output, returning its hash.
    fn finish_output(
        &self,
        created: &Utf8Path,
        name: &str,
        record: &ScanRecord,
        reorienter: &dyn Reorienter,
    ) -> Result<String, String> {
        let stem = created.file_name().unwrap_or_default();
        let siblings = list_dir(self.nii_dir).map_err(|err| err.to_string())?;
        let eq_prefix = format!("{stem}_Eq");
        if siblings.iter().filter_map(|p| p.file_name()).any(|file| {
            file.starts_with(&eq_prefix) && file.ends_with(self.ext)
        }) {
            return Err("slices missing, converter wrote an equalized volume".to_owned());
        }

        let volume = with_suffix(created, self.ext);
        reorienter.reorient(&volume, record.plane())?;

        let adc = with_suffix(created, &format!("_ADC{}", self.ext));
        if adc.exists() {
            debug!(path = %adc, "removing ADC byproduct");
            std::fs::remove_file(&adc).map_err(|err| format!("cannot remove {adc}: {err}"))?;
        }

        if stem != name {
            let dotted = format!("{stem}.");
            for file in &siblings {
                let Some(rest) = file
                    .file_name()
                    .and_then(|f| f.strip_prefix(&dotted))
                else {
                    continue;
                };
                let target = self.nii_dir.join(format!("{name}.{rest}"));
                std::fs::rename(file, &target)
                    .map_err(|err| format!("cannot rename {file} to {target}: {err}"))?;
            }
        }

        let target = self.volume(name);
        if !target.exists() {
            return Err(format!("volume missing: {target}"));
        }
        hash_file(&target, false).map_err(|err| format!("cannot hash {target}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConverter, named_record, root};
    use si_core::{Config, ExclusionReason};
    use std::fs;
    use tempfile::TempDir;

    const T1: &str = "P_01-01_BRAIN-T1-SE-2D-AXIAL-PRE";
    const ECHO1: &str = "P_01-02_BRAIN-T2STAR-GRE-2D-AXIAL-PRE-ECHO1";
    const ECHO2: &str = "P_01-02_BRAIN-T2STAR-GRE-2D-AXIAL-PRE-ECHO2";

    fn ctx() -> RunContext {
        RunContext::new(Config::default())
    }

    fn nii_files(session: &Utf8Path) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(session.join(NII_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_group_by_source() {
        let records = vec![
            named_record("1.01", "dcm/1", T1),
            named_record("2.01", "dcm/2", ECHO1),
            named_record("2.02", "dcm/2", ECHO2),
        ];
        let groups = group_by_source(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].1, vec![1, 2]);
    }

    #[test]
    fn test_single_output() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![named_record("1.01", "dcm/1", T1)];
        let converter = FakeConverter {
            extra_files: vec!["_ADC.nii.gz".to_owned()],
            ..FakeConverter::default()
        };
        let ctx = ctx();

        let report = convert_records(&mut records, &session, &converter, &ctx).unwrap();
        assert_eq!(
            report,
            ConversionReport {
                groups: 1,
                failed_groups: 0,
                converted: 1,
                failed: 0
            }
        );
        assert!(records[0].converted);
        assert_eq!(records[0].output_hash.as_ref().map(String::len), Some(64));
        assert_eq!(nii_files(&session), vec![format!("{T1}.nii.gz")]);
        assert_eq!(converter.calls(), vec![(session.join("dcm/1"), T1.to_owned())]);
        assert_eq!(ctx.stats().snapshot().groups_converted, 1);
    }

    #[test]
    fn test_echo_group_renamed() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![
            named_record("2.01", "dcm/2", ECHO1),
            named_record("2.02", "dcm/2", ECHO2),
        ];
        let converter = FakeConverter {
            suffixes: vec!["_e1".to_owned(), "_e2".to_owned()],
            ..FakeConverter::default()
        };
        convert_records(&mut records, &session, &converter, &ctx()).unwrap();

        assert!(records.iter().all(|r| r.converted));
        assert_eq!(
            nii_files(&session),
            vec![format!("{ECHO1}.nii.gz"), format!("{ECHO2}.nii.gz")]
        );
        let first = fs::read_to_string(session.join(format!("nii/{ECHO2}.nii.gz"))).unwrap();
        assert!(first.ends_with("_e2"));
    }

    #[test]
    fn test_collision_skips_converter() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        fs::create_dir_all(session.join(NII_DIR)).unwrap();
        fs::write(session.join(format!("nii/{T1}.nii.gz")), b"old").unwrap();
        let mut records = vec![named_record("1.01", "dcm/1", T1)];
        let converter = FakeConverter::default();

        let report = convert_records(&mut records, &session, &converter, &ctx()).unwrap();
        assert_eq!(report.failed_groups, 1);
        assert!(converter.calls().is_empty());
        assert!(records[0].failure.as_deref().unwrap().contains("naming collision"));
        assert_eq!(
            fs::read(session.join(format!("nii/{T1}.nii.gz"))).unwrap(),
            b"old"
        );
    }

    #[test]
    fn test_converter_failure_removes_outputs() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![
            named_record("1.01", "dcm/1", T1),
            named_record("2.01", "dcm/2", ECHO1),
        ];
        let converter = FakeConverter {
            fail_on: Some(T1.to_owned()),
            ..FakeConverter::default()
        };
        let ctx = ctx();

        let report = convert_records(&mut records, &session, &converter, &ctx).unwrap();
        assert_eq!(report.failed_groups, 1);
        assert_eq!(report.converted, 1);
        assert!(!records[0].converted);
        assert!(records[1].converted);
        assert_eq!(nii_files(&session), vec![format!("{ECHO1}.nii.gz")]);
        assert_eq!(ctx.stats().snapshot().groups_failed, 1);
    }

    #[test]
    fn test_unmatched_outputs_fail_group() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![
            named_record("2.01", "dcm/2", ECHO1),
            named_record("2.02", "dcm/2", ECHO2),
        ];
        let converter = FakeConverter {
            suffixes: vec!["_c1".to_owned(), "_c2".to_owned()],
            ..FakeConverter::default()
        };
        let report = convert_records(&mut records, &session, &converter, &ctx()).unwrap();
        assert_eq!(report.failed, 2);
        assert!(nii_files(&session).is_empty());
    }

    #[test]
    fn test_equalized_output_fails_only_that_output() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![named_record("1.01", "dcm/1", T1)];
        let converter = FakeConverter {
            extra_files: vec!["_Eq_1.nii.gz".to_owned()],
            ..FakeConverter::default()
        };
        let report = convert_records(&mut records, &session, &converter, &ctx()).unwrap();
        assert_eq!(report.failed_groups, 0);
        assert_eq!(report.failed, 1);
        assert!(records[0].failure.as_deref().unwrap().contains("slices missing"));
        assert!(nii_files(&session).is_empty());
    }

    #[test]
    fn test_reorient_failure() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut records = vec![named_record("1.01", "dcm/1", T1)];
        let converter = FakeConverter {
            reorient_fails: true,
            ..FakeConverter::default()
        };
        convert_records(&mut records, &session, &converter, &ctx()).unwrap();
        assert!(!records[0].converted);
        assert!(nii_files(&session).is_empty());
    }

    #[test]
    fn test_excluded_group_skipped() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir);
        let mut record = named_record("1.01", "dcm/1", T1);
        record.exclude(ExclusionReason::DerivedMap);
        let mut records = vec![record];
        let converter = FakeConverter::default();
        let report = convert_records(&mut records, &session, &converter, &ctx()).unwrap();
        assert_eq!(report.groups, 0);
        assert!(converter.calls().is_empty());
    }
}
