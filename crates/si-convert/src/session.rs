//! Fresh conversion of a source directory or archive into a session
//! directory.
//!
//! A session directory lives at
//! `[project/]{PROJECT}-[{SITE}-]{SUBJECT}/{SESSION}[-{attempt}]/` under the
//! output root and holds:
//!
//! - `dcm/` or `parrec/`: the sorted raw copy of the source, removed after
//!   an anonymized run
//! - `nii/`: converted volumes with their `.json` and `.prov` sidecars
//! - `logs/`: the run summary
//! - `{prefix}_UnconvertedInfo.json`: the session record
//! - `{subject}_{session}_Provenance.yml`: the provenance log
//! - `{prefix}_ManualNaming.json`: operator overrides, if any

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use si_core::digest::{hash_bytes, hash_file_set};
use si_core::{LookupTable, ManualNames, RawFormat, RunContext, Session, SessionId, StatsSnapshot};
use si_naming::{NamingReport, load_lookup_table, load_manual_names, name_records};
use si_sorter::{load_dicom_records, load_parrec_records, sort_dicom, sort_parrec};
use tracing::{info, warn};

use crate::anonymize::Anonymization;
use crate::converter::Converter;
use crate::error::ConvertError;
use crate::input::{InputMode, source_files, stage_input};
use crate::orchestrator::{ConversionReport, NII_DIR, convert_records};
use crate::provenance::Provenance;
use crate::record::{ScannerDefaults, SessionRecord};

/// Run summary file, relative to the session's `logs/` directory.
pub const SUMMARY_FILE: &str = "conversion.json";

/// Paths inside one session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    dir: Utf8PathBuf,
    id: SessionId,
    format: RawFormat,
}

impl SessionLayout {
    /// Places the session for `id` under `output_root`.
    #[must_use]
    pub fn new(output_root: &Utf8Path, id: SessionId, format: RawFormat, project_subdir: bool) -> Self {
        Self {
            dir: output_root.join(id.relative_dir(project_subdir)),
            id,
            format,
        }
    }

    /// Uses an existing session directory.
    #[must_use]
    pub fn open(dir: &Utf8Path, id: SessionId, format: RawFormat) -> Self {
        Self {
            dir: dir.to_owned(),
            id,
            format,
        }
    }

    /// The session directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The session identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// The raw data format.
    #[inline]
    #[must_use]
    pub const fn format(&self) -> RawFormat {
        self.format
    }

    /// Sorted raw data.
    #[must_use]
    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.dir.join(self.format.dir_name())
    }

    /// Converted volumes.
    #[must_use]
    pub fn nii_dir(&self) -> Utf8PathBuf {
        self.dir.join(NII_DIR)
    }

    /// Run logs.
    #[must_use]
    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.dir.join("logs")
    }

    /// Quality-control output written by downstream tools.
    #[must_use]
    pub fn qa_dir(&self) -> Utf8PathBuf {
        self.dir.join("qa")
    }

    /// Holding area for the previous output during an update.
    #[must_use]
    pub fn prev_dir(&self) -> Utf8PathBuf {
        self.dir.join("prev")
    }

    /// The session record.
    #[must_use]
    pub fn record_path(&self) -> Utf8PathBuf {
        self.dir.join(self.id.record_file_name())
    }

    /// The provenance log.
    #[must_use]
    pub fn provenance_path(&self) -> Utf8PathBuf {
        self.dir.join(self.id.provenance_file_name())
    }

    /// The manual naming file.
    #[must_use]
    pub fn manual_names_path(&self) -> Utf8PathBuf {
        self.dir.join(self.id.manual_names_file_name())
    }

    /// The run summary.
    #[must_use]
    pub fn summary_path(&self) -> Utf8PathBuf {
        self.logs_dir().join(SUMMARY_FILE)
    }

    fn with_attempt(&self, output_root: &Utf8Path, attempt: u32, project_subdir: bool) -> Self {
        Self::new(
            output_root,
            self.id.clone().with_attempt(Some(attempt)),
            self.format,
            project_subdir,
        )
    }
}

/// Returns the default lookup table path for `project`.
///
/// The table sits beside the project's subject directories:
/// `{root}/{project}/{project}-lut.csv` with a project subdirectory,
/// `{root}/{project}-lut.csv` without, the project in lower case.
#[must_use]
pub fn default_lookup_path(output_root: &Utf8Path, project: &str, project_subdir: bool) -> Utf8PathBuf {
    let project = project.to_lowercase();
    let file = format!("{project}-lut.csv");
    if project_subdir {
        output_root.join(project).join(file)
    } else {
        output_root.join(file)
    }
}

/// What to do when the session already holds raw data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistingSession {
    /// Refuse to convert.
    #[default]
    Fail,
    /// Convert into the next free attempt directory (`{SESSION}-2`, ...).
    NewAttempt,
    /// Replace the existing output if the source content is unchanged.
    Replace,
    /// Replace the existing output without checking the source.
    ReplaceUnchecked,
}

/// Everything needed for a fresh conversion.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Directory or archive holding the raw files.
    pub source: Utf8PathBuf,
    /// Root of the output tree.
    pub output_root: Utf8PathBuf,
    /// Session identity.
    pub id: SessionId,
    /// Raw data format.
    pub format: RawFormat,
    /// Place the session under a lower-case project directory.
    pub project_subdir: bool,
    /// Lookup table; defaults to [`default_lookup_path`].
    pub lookup_path: Option<Utf8PathBuf>,
    /// Input hash computed by an earlier run; skips hashing the source.
    pub input_hash: Option<String>,
    /// Handling of an existing session.
    pub existing: ExistingSession,
    /// Scanner attributes missing from the headers.
    pub scanner: ScannerDefaults,
    /// The command line, for provenance.
    pub command: String,
    /// How source directory files reach the raw directory.
    pub input_mode: InputMode,
    /// Replace identifying attributes and drop the raw data afterwards.
    pub anonymize: Option<Anonymization>,
}

impl ConvertRequest {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(
        source: impl Into<Utf8PathBuf>,
        output_root: impl Into<Utf8PathBuf>,
        id: SessionId,
        format: RawFormat,
    ) -> Self {
        Self {
            source: source.into(),
            output_root: output_root.into(),
            id,
            format,
            project_subdir: false,
            lookup_path: None,
            input_hash: None,
            existing: ExistingSession::default(),
            scanner: ScannerDefaults::default(),
            command: String::new(),
            input_mode: InputMode::default(),
            anonymize: None,
        }
    }
}

/// Outcome of a successful conversion or update.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// The session directory.
    pub dir: Utf8PathBuf,
    /// The name prefix.
    pub prefix: String,
    /// Naming counts.
    pub naming: NamingReport,
    /// Conversion counts.
    pub conversion: ConversionReport,
    /// Run statistics.
    pub stats: StatsSnapshot,
}

/// Inputs of one pass over an already sorted raw directory.
pub(crate) struct PipelineRun {
    pub input_hash: String,
    pub lookup: LookupTable,
    pub manual_names: ManualNames,
    pub scanner: ScannerDefaults,
    pub project_subdir: bool,
    pub command: String,
    pub anonymize: Option<Anonymization>,
    pub start: DateTime<Utc>,
}

fn remove_path(path: &Utf8Path) -> Result<(), ConvertError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return Ok(());
    };
    result.map_err(|err| ConvertError::io("remove", path, err))
}

/// Removes what a conversion writes, keeping overrides and the provenance
/// log.
fn clear_outputs(layout: &SessionLayout) -> Result<(), ConvertError> {
    for path in [
        layout.raw_dir(),
        layout.nii_dir(),
        layout.qa_dir(),
        layout.record_path(),
        layout.summary_path(),
    ] {
        remove_path(&path)?;
    }
    Ok(())
}

/// Resolves an existing session according to `request.existing`.
///
/// Returns the layout to convert into.
fn prepare_layout(
    request: &ConvertRequest,
    layout: SessionLayout,
    input_hash: &str,
) -> Result<SessionLayout, ConvertError> {
    // Anonymized sessions keep only their record.
    if !layout.raw_dir().exists() && !layout.record_path().exists() {
        return Ok(layout);
    }
    match request.existing {
        ExistingSession::Fail => Err(ConvertError::SessionExists(layout.dir().to_owned())),
        ExistingSession::NewAttempt => {
            let mut attempt = 2;
            let mut next = layout.with_attempt(&request.output_root, attempt, request.project_subdir);
            while next.dir().exists() {
                attempt += 1;
                next = layout.with_attempt(&request.output_root, attempt, request.project_subdir);
            }
            info!(dir = %next.dir(), "session exists, converting as a new attempt");
            Ok(next)
        }
        ExistingSession::Replace => {
            let saved = SessionRecord::read(&layout.record_path())?;
            if saved.session.input_hash != input_hash {
                return Err(ConvertError::InputChanged {
                    recorded: saved.session.input_hash,
                    found: input_hash.to_owned(),
                });
            }
            info!(dir = %layout.dir(), "replacing session with unchanged input");
            clear_outputs(&layout)?;
            Ok(layout)
        }
        ExistingSession::ReplaceUnchecked => {
            warn!(dir = %layout.dir(), "replacing session without checking input");
            clear_outputs(&layout)?;
            Ok(layout)
        }
    }
}

/// Converts a source directory or archive into a new session.
///
/// The source is copied, linked or extracted, never modified. The staged
/// files are sorted into the raw directory, then named and converted; the
/// session record, provenance log and run summary are written last. If any
/// step fails, everything this run created is removed again.
///
/// With [`ConvertRequest::anonymize`] set, identifiers are replaced after
/// naming and the raw directory is removed once the run succeeds.
///
/// # Errors
///
/// - [`ConvertError::UnsupportedSource`] if the source is neither a
///   directory nor a supported archive
/// - [`ConvertError::SessionExists`] if the session holds raw data or a
///   session record and `request.existing` is [`ExistingSession::Fail`]
/// - [`ConvertError::InputChanged`] if a [`ExistingSession::Replace`] finds
///   different source content
/// - [`ConvertError::Sort`] / [`ConvertError::Naming`] for stage failures
/// - [`ConvertError::NoSeries`] / [`ConvertError::NothingConverted`] if no
///   volume could be produced
pub fn convert_session(
    request: &ConvertRequest,
    converter: &dyn Converter,
    ctx: &RunContext,
) -> Result<SessionSummary, ConvertError> {
    let start = Utc::now();
    let id = &request.id;
    info!(session = %id, source = %request.source, "converting session");

    let lookup_path = request.lookup_path.clone().unwrap_or_else(|| {
        default_lookup_path(&request.output_root, &id.project, request.project_subdir)
    });
    let lookup = load_lookup_table(&lookup_path, &id.project, id.site.as_deref())?;

    let layout = SessionLayout::new(&request.output_root, id.clone(), request.format, request.project_subdir);
    let manual_names = load_manual_names(&layout.manual_names_path())?;

    let files = source_files(&request.source, ctx.config().sort.follow_links)?;
    let input_hash = match &request.input_hash {
        Some(hash) => hash.clone(),
        None => hash_file_set(files.iter().map(Utf8PathBuf::as_path))
            .map_err(|err| ConvertError::io("hash", request.source.as_path(), err))?,
    };

    let layout = prepare_layout(request, layout, &input_hash)?;
    let created_dir = !layout.dir().exists();
    let run = PipelineRun {
        input_hash,
        lookup,
        manual_names,
        scanner: request.scanner.clone(),
        project_subdir: request.project_subdir,
        command: request.command.clone(),
        anonymize: request.anonymize,
        start,
    };

    let result = populate(&layout, &files, request, ctx)
        .and_then(|()| run_pipeline(&layout, run, converter, ctx));
    if let Err(err) = &result {
        warn!(dir = %layout.dir(), error = %err, "conversion failed, removing output");
        let cleanup = if created_dir {
            remove_path(layout.dir())
        } else {
            clear_outputs(&layout)
        };
        if let Err(cleanup) = cleanup {
            warn!(error = %cleanup, "could not remove partial output");
        }
    }
    result
}

fn populate(
    layout: &SessionLayout,
    files: &[Utf8PathBuf],
    request: &ConvertRequest,
    ctx: &RunContext,
) -> Result<(), ConvertError> {
    let raw = layout.raw_dir();
    let logs = layout.logs_dir();
    for dir in [&raw, &logs] {
        fs::create_dir_all(dir)
            .map_err(|err| ConvertError::io("create directory", dir.as_path(), err))?;
    }
    stage_input(&request.source, files, &raw, request.input_mode)?;
    let report = match layout.format() {
        RawFormat::Dicom => sort_dicom(&raw, ctx)?,
        RawFormat::ParRec => sort_parrec(&raw, ctx)?,
    };
    info!(series = report.series.len(), skipped = report.skipped.len(), "raw data sorted");
    Ok(())
}

/// Names and converts the sorted raw directory of `layout`, then writes the
/// session record, sidecars, provenance and summary.
pub(crate) fn run_pipeline(
    layout: &SessionLayout,
    mut run: PipelineRun,
    converter: &dyn Converter,
    ctx: &RunContext,
) -> Result<SessionSummary, ConvertError> {
    let raw = layout.raw_dir();
    let mut records = match layout.format() {
        RawFormat::Dicom => load_dicom_records(&raw)?,
        RawFormat::ParRec => load_parrec_records(&raw)?,
    };
    if records.is_empty() {
        return Err(ConvertError::NoSeries(raw));
    }
    let format_dir = Utf8Path::new(layout.format().dir_name());
    for record in &mut records {
        record.source_path = format_dir.join(&record.source_path);
        run.scanner.apply(record);
    }

    let prefix = layout.id().prefix();
    let naming = name_records(&mut records, &prefix, &run.lookup, &run.manual_names, ctx)?;
    if let Some(anonymization) = &run.anonymize {
        anonymization.apply(&mut records, &mut run.lookup);
        run.scanner.institution = run.scanner.institution.as_deref().map(|v| hash_bytes(v.as_bytes()));
    }
    let conversion = convert_records(&mut records, layout.dir(), converter, ctx)?;
    if conversion.groups > 0 && conversion.converted == 0 {
        return Err(ConvertError::NothingConverted {
            groups: conversion.groups,
        });
    }

    let mut session = Session::new(layout.id().clone(), layout.format(), run.input_hash);
    session.lookup = run.lookup;
    session.manual_names = run.manual_names;
    session.records = records;
    let mut record = SessionRecord::new(session, converter.version(), run.project_subdir, run.scanner);
    record.anonymized = run.anonymize.is_some();
    record.write(&layout.record_path())?;
    record.write_sidecars(&layout.nii_dir())?;

    let parameters = vec![
        ("format".to_owned(), layout.format().dir_name().to_owned()),
        ("input_hash".to_owned(), record.session.input_hash.clone()),
        ("lookup_fingerprint".to_owned(), record.lookup_fingerprint.clone()),
        ("converter".to_owned(), record.versions.converter.clone()),
        ("project_subdir".to_owned(), run.project_subdir.to_string()),
        ("anonymized".to_owned(), record.anonymized.to_string()),
    ];
    let provenance = Provenance::for_session(
        &record.session,
        ctx.config().convert.volume_extension(),
        run.start,
        run.command,
        parameters,
    );
    provenance.write_output_files(layout.dir())?;

    let summary = SessionSummary {
        dir: layout.dir().to_owned(),
        prefix,
        naming,
        conversion,
        stats: ctx.stats().snapshot(),
    };
    let logs = layout.logs_dir();
    fs::create_dir_all(&logs).map_err(|err| ConvertError::io("create directory", &logs, err))?;
    let summary_path = layout.summary_path();
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|err| ConvertError::json(&summary_path, err))?;
    fs::write(&summary_path, json).map_err(|err| ConvertError::io("write", &summary_path, err))?;
    if record.anonymized {
        remove_path(&raw)?;
        info!(dir = %raw, "raw data removed from anonymized session");
    }

    provenance.append_to_log(&layout.provenance_path())?;
    info!(
        dir = %layout.dir(),
        converted = conversion.converted,
        failed = conversion.failed,
        "session complete"
    );
    Ok(summary)
}
