//! Reruns of naming and conversion on an existing session.
//!
//! An update works from the sorted raw copy and the session record alone;
//! the original source is not needed. The previous output is moved into
//! `prev/` first and either discarded once the rerun succeeds or moved back
//! if it fails.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use si_core::RunContext;
use si_naming::{load_lookup_table, load_manual_names};
use tracing::{debug, info, warn};

use crate::converter::Converter;
use crate::error::ConvertError;
use crate::record::SessionRecord;
use crate::session::{PipelineRun, SessionLayout, SessionSummary, default_lookup_path, run_pipeline};

/// Everything needed to update one session.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// The session directory.
    pub dir: Utf8PathBuf,
    /// Lookup table; defaults to the project's table under the output root.
    pub lookup_path: Option<Utf8PathBuf>,
    /// Rerun even if nothing has changed.
    pub force: bool,
    /// The command line, for provenance.
    pub command: String,
}

/// Result of [`update_session`].
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Tool version and overrides are unchanged; nothing was done.
    UpToDate,
    /// The session was renamed and reconverted.
    Updated(SessionSummary),
}

/// Finds the session record inside a session directory.
///
/// The record is named after the subject directory and the session label,
/// with any attempt suffix removed.
///
/// # Errors
///
/// Returns [`ConvertError::MissingRecord`] if no record exists.
pub fn find_session_record(dir: &Utf8Path) -> Result<Utf8PathBuf, ConvertError> {
    let subject = dir.parent().and_then(Utf8Path::file_name).unwrap_or_default();
    let session = dir.file_name().unwrap_or_default();
    let mut candidates = vec![dir.join(format!("{subject}_{session}_UnconvertedInfo.json"))];
    if let Some((base, attempt)) = session.rsplit_once('-') {
        if attempt.parse::<u32>().is_ok() {
            candidates.push(dir.join(format!("{subject}_{base}_UnconvertedInfo.json")));
        }
    }
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| ConvertError::MissingRecord(candidates[0].clone()))
}

/// Derives the output root from a session directory.
fn output_root(dir: &Utf8Path, project_subdir: bool) -> Utf8PathBuf {
    let depth = if project_subdir { 3 } else { 2 };
    dir.ancestors()
        .nth(depth)
        .map_or_else(Utf8PathBuf::new, ToOwned::to_owned)
}

/// Output moved aside during a rerun.
struct Stash {
    prev: Utf8PathBuf,
    moved: Vec<(Utf8PathBuf, Utf8PathBuf)>,
    replaced: Vec<Utf8PathBuf>,
}

impl Stash {
    /// Moves every existing item of `items` into `prev`.
    ///
    /// `items` must be direct children of the session directory. If a move
    /// fails, the items already moved are put back and `prev` is removed.
    fn create(prev: Utf8PathBuf, items: Vec<Utf8PathBuf>) -> Result<Self, ConvertError> {
        if prev.exists() {
            return Err(ConvertError::io(
                "stash output into",
                prev,
                io::Error::new(io::ErrorKind::AlreadyExists, "left behind by an earlier update"),
            ));
        }
        fs::create_dir(&prev).map_err(|err| ConvertError::io("create directory", &prev, err))?;
        let mut moved = Vec::new();
        for item in &items {
            let Some(name) = item.file_name() else {
                continue;
            };
            if !item.exists() {
                continue;
            }
            let target = prev.join(name);
            if let Err(err) = fs::rename(item, &target) {
                unwind(&prev, &moved);
                return Err(ConvertError::io("move", item.as_path(), err));
            }
            debug!(from = %item, to = %target, "stashed");
            moved.push((item.clone(), target));
        }
        Ok(Self {
            prev,
            moved,
            replaced: items,
        })
    }

    /// Removes everything the rerun wrote and moves the stashed items back.
    fn restore(self) -> Result<(), ConvertError> {
        for item in &self.replaced {
            let removed = if item.is_dir() {
                fs::remove_dir_all(item)
            } else if item.exists() {
                fs::remove_file(item)
            } else {
                continue;
            };
            removed.map_err(|err| ConvertError::io("remove", item.as_path(), err))?;
        }
        for (original, stashed) in &self.moved {
            fs::rename(stashed, original)
                .map_err(|err| ConvertError::io("restore", stashed.as_path(), err))?;
        }
        fs::remove_dir_all(&self.prev).map_err(|err| ConvertError::io("remove", &self.prev, err))
    }

    fn discard(self) -> Result<(), ConvertError> {
        fs::remove_dir_all(&self.prev).map_err(|err| ConvertError::io("remove", &self.prev, err))
    }
}

/// Moves stashed items back after a failed stash.
///
/// `prev` is only removed once it is empty again; anything that could not be
/// moved back stays there.
fn unwind(prev: &Utf8Path, moved: &[(Utf8PathBuf, Utf8PathBuf)]) {
    for (original, stashed) in moved.iter().rev() {
        if let Err(err) = fs::rename(stashed, original) {
            warn!(from = %stashed, to = %original, error = %err, "failed to unstash");
        }
    }
    if let Err(err) = fs::remove_dir(prev) {
        warn!(path = %prev, error = %err, "failed to remove stash directory");
    }
}

/// Renames and reconverts an existing session.
///
/// Nothing happens unless `request.force` is set or the tool version, the
/// lookup table or the manual names differ from the ones recorded. The
/// rerun reuses the recorded input hash. On failure the session is put back
/// exactly as it was.
///
/// # Errors
///
/// - [`ConvertError::MissingRecord`] if the directory holds no session
///   record
/// - [`ConvertError::Anonymized`] if a rerun is needed but the session was
///   anonymized
/// - [`ConvertError::RolledBack`] if the rerun failed and the previous
///   output was restored
/// - [`ConvertError::RollbackFailed`] if restoring failed too; the previous
///   output is then left in `prev/`
pub fn update_session(
    request: &UpdateRequest,
    converter: &dyn Converter,
    ctx: &RunContext,
) -> Result<UpdateOutcome, ConvertError> {
    let start = Utc::now();
    let record_path = find_session_record(&request.dir)?;
    let saved = SessionRecord::read(&record_path)?;
    let id = saved.session.id.clone();
    let layout = SessionLayout::open(&request.dir, id.clone(), saved.session.format);

    let lookup_path = request.lookup_path.clone().unwrap_or_else(|| {
        default_lookup_path(
            &output_root(&request.dir, saved.project_subdir),
            &id.project,
            saved.project_subdir,
        )
    });
    let lookup = if lookup_path.is_file() {
        load_lookup_table(&lookup_path, &id.project, id.site.as_deref())?
    } else {
        warn!(path = %lookup_path, "lookup table not found, keeping the recorded one");
        saved.session.lookup.clone()
    };
    let manual_names = load_manual_names(&layout.manual_names_path())?;

    if !request.force && saved.is_current(&lookup, &manual_names) {
        info!(session = %id, "session is up to date");
        return Ok(UpdateOutcome::UpToDate);
    }
    if saved.anonymized {
        return Err(ConvertError::Anonymized(request.dir.clone()));
    }

    info!(session = %id, force = request.force, "updating session");
    let stash = Stash::create(
        layout.prev_dir(),
        vec![layout.nii_dir(), layout.qa_dir(), record_path, layout.summary_path()],
    )?;
    let run = PipelineRun {
        input_hash: saved.session.input_hash,
        lookup,
        manual_names,
        scanner: saved.scanner,
        project_subdir: saved.project_subdir,
        command: request.command.clone(),
        anonymize: None,
        start,
    };

    match run_pipeline(&layout, run, converter, ctx) {
        Ok(summary) => {
            stash.discard()?;
            Ok(UpdateOutcome::Updated(summary))
        }
        Err(cause) => {
            warn!(session = %id, error = %cause, "update failed, restoring previous output");
            match stash.restore() {
                Ok(()) => Err(ConvertError::RolledBack(Box::new(cause))),
                Err(restore) => Err(ConvertError::RollbackFailed {
                    cause: Box::new(cause),
                    restore: Box::new(restore),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymize::Anonymization;
    use crate::error::FailureKind;
    use crate::session::{ConvertRequest, convert_session};
    use crate::test_support::{FakeConverter, PAR_TAIL, par_source, root, write_manual_names};
    use si_core::{Config, RawFormat, SessionId};
    use tempfile::TempDir;

    fn ctx() -> RunContext {
        RunContext::new(Config::default())
    }

    /// Converts the PAR fixture and returns the session directory.
    fn converted(root: &Utf8Path) -> Utf8PathBuf {
        let id = SessionId::new("p", "0001", "01");
        let request = ConvertRequest::new(par_source(root), root.join("out"), id, RawFormat::ParRec);
        let dir = root.join("out/P-0001/01");
        write_manual_names(&dir.join("P-0001_01_ManualNaming.json"), serde_json::json!(PAR_TAIL));
        convert_session(&request, &FakeConverter::default(), &ctx()).unwrap();
        dir
    }

    fn snapshot(dir: &Utf8Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = si_sorter::FileWalker::new(dir)
            .unwrap()
            .collect_paths()
            .unwrap()
            .into_iter()
            .map(|path| {
                let content = fs::read(&path).unwrap();
                (path.strip_prefix(dir).unwrap().to_string(), content)
            })
            .collect();
        files.sort();
        files
    }

    fn request(dir: &Utf8Path) -> UpdateRequest {
        UpdateRequest {
            dir: dir.to_owned(),
            command: "seriesid update".to_owned(),
            ..UpdateRequest::default()
        }
    }

    #[test]
    fn test_find_session_record() {
        let dir = TempDir::new().unwrap();
        let session = root(&dir).join("P-0001/01-2");
        fs::create_dir_all(&session).unwrap();
        assert!(matches!(
            find_session_record(&session),
            Err(ConvertError::MissingRecord(_))
        ));

        fs::write(session.join("P-0001_01_UnconvertedInfo.json"), "{}").unwrap();
        assert_eq!(
            find_session_record(&session).unwrap(),
            session.join("P-0001_01_UnconvertedInfo.json")
        );
    }

    #[test]
    fn test_output_root() {
        assert_eq!(output_root(Utf8Path::new("/out/P-1/01"), false).as_str(), "/out");
        assert_eq!(output_root(Utf8Path::new("/out/p/P-1/01"), true).as_str(), "/out");
    }

    #[test]
    fn test_unchanged_session_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        let before = snapshot(&session);

        let outcome = update_session(&request(&session), &FakeConverter::default(), &ctx()).unwrap();
        assert!(matches!(outcome, UpdateOutcome::UpToDate));
        assert_eq!(snapshot(&session), before);
    }

    #[test]
    fn test_forced_update() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        let converter = FakeConverter::default();
        let request = UpdateRequest {
            force: true,
            ..request(&session)
        };

        let outcome = update_session(&request, &converter, &ctx()).unwrap();
        let UpdateOutcome::Updated(summary) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(summary.conversion.converted, 1);
        assert!(!session.join("prev").exists());
        assert_eq!(converter.calls().len(), 1);
        assert_eq!(
            converter.calls()[0].0,
            session.join("parrec/2.25.77.5.1.par")
        );
        let log = fs::read_to_string(session.join("P-0001_01_Provenance.yml")).unwrap();
        assert_eq!(log.matches("---\nId: ").count(), 2);
        assert!(log.contains("Command: seriesid update\n"));
    }

    #[test]
    fn test_changed_manual_name_reruns() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        write_manual_names(
            &session.join("P-0001_01_ManualNaming.json"),
            serde_json::json!(false),
        );

        let outcome = update_session(&request(&session), &FakeConverter::default(), &ctx()).unwrap();
        let UpdateOutcome::Updated(summary) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(summary.naming.named, 0);
        assert_eq!(summary.conversion.groups, 0);
        let saved = SessionRecord::read(&session.join("P-0001_01_UnconvertedInfo.json")).unwrap();
        assert!(saved.session.records.iter().all(|record| !record.converted));
        assert!(fs::read_dir(session.join("nii")).unwrap().next().is_none());
    }

    #[test]
    fn test_failed_rerun_restores_output() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        fs::create_dir(session.join("qa")).unwrap();
        fs::write(session.join("qa/report.txt"), b"ok").unwrap();
        let before = snapshot(&session);

        let converter = FakeConverter {
            fail_all: true,
            ..FakeConverter::default()
        };
        let request = UpdateRequest {
            force: true,
            ..request(&session)
        };
        let err = update_session(&request, &converter, &ctx()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::RolledBack);
        assert!(matches!(
            &err,
            ConvertError::RolledBack(cause) if matches!(**cause, ConvertError::NothingConverted { .. })
        ));
        assert_eq!(snapshot(&session), before);
    }

    #[test]
    fn test_failed_stash_puts_moved_items_back() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        fs::create_dir_all(session.join("qa/nii")).unwrap();
        fs::write(session.join("qa/nii/report.txt"), b"ok").unwrap();
        let before = snapshot(&session);

        // The second item lands on the non-empty `prev/nii`, so its move fails.
        let result = Stash::create(
            session.join("prev"),
            vec![session.join("nii"), session.join("qa/nii")],
        );
        assert!(matches!(result, Err(ConvertError::Io { .. })));
        assert!(!session.join("prev").exists());
        assert_eq!(snapshot(&session), before);

        let request = UpdateRequest {
            force: true,
            ..request(&session)
        };
        assert!(update_session(&request, &FakeConverter::default(), &ctx()).is_ok());
    }

    #[test]
    fn test_anonymized_session_is_not_rerun() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        let id = SessionId::new("p", "0001", "01");
        let session = root.join("out/P-0001/01");
        write_manual_names(&session.join("P-0001_01_ManualNaming.json"), serde_json::json!(PAR_TAIL));
        let convert = ConvertRequest {
            anonymize: Some(Anonymization::default()),
            ..ConvertRequest::new(par_source(&root), root.join("out"), id, RawFormat::ParRec)
        };
        convert_session(&convert, &FakeConverter::default(), &ctx()).unwrap();
        let before = snapshot(&session);

        let outcome = update_session(&request(&session), &FakeConverter::default(), &ctx()).unwrap();
        assert!(matches!(outcome, UpdateOutcome::UpToDate));

        let forced = UpdateRequest {
            force: true,
            ..request(&session)
        };
        let err = update_session(&forced, &FakeConverter::default(), &ctx()).unwrap_err();
        assert!(matches!(err, ConvertError::Anonymized(_)));
        assert_eq!(snapshot(&session), before);
    }

    #[test]
    fn test_leftover_backup_blocks_update() {
        let dir = TempDir::new().unwrap();
        let session = converted(&root(&dir));
        fs::create_dir(session.join("prev")).unwrap();
        let request = UpdateRequest {
            force: true,
            ..request(&session)
        };
        let err = update_session(&request, &FakeConverter::default(), &ctx()).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
        assert!(session.join("nii").is_dir());
    }
}
