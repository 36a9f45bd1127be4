//! CLI entry point for the seriesid tool.
//!
//! This binary sorts, names and converts raw scan sessions, and renames
//! existing sessions after the lookup table or manual names change.
//!
//! # Usage
//!
//! ```bash
//! seriesid [OPTIONS] <COMMAND>
//!
//! # Convert a DICOM export into /data/STUDY-0042/01
//! seriesid convert /incoming/exam42 --output /data --project study --subject 0042 --session 01
//!
//! # Rename sessions after editing the lookup table
//! seriesid update /data/STUDY-0042/01 /data/STUDY-0043/01
//!
//! # Show the names a sorted directory would get
//! seriesid classify /data/STUDY-0042/01/dcm --prefix STUDY-0042_01
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use serde::Serialize;
use si_convert::{
    Anonymization, ConvertError, ConvertRequest, Dcm2niix, ExistingSession, FailureKind, InputMode,
    ScannerDefaults, SessionSummary, UpdateOutcome, UpdateRequest, convert_session, update_session,
};
use si_core::{Config, LookupTable, ManualNames, RawFormat, RunContext, ScanRecord, SessionId};
use si_naming::{load_lookup_table, load_manual_names, name_records};
use si_sorter::{load_dicom_records, load_parrec_records};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Sorts, names and converts tomographic scan sessions.
///
/// Raw DICOM or PAR/REC files are grouped into series, every series gets a
/// unique descriptive name, and each is handed to an external converter.
#[derive(Parser)]
#[command(name = "seriesid", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "SERIESID_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert a raw source directory into a new session.
    Convert(ConvertArgs),

    /// Rename and reconvert existing sessions.
    Update {
        /// Session directories.
        #[arg(required = true)]
        dirs: Vec<Utf8PathBuf>,

        /// Lookup table (defaults to the project table under the output root).
        #[arg(long)]
        lookup: Option<Utf8PathBuf>,

        /// Rerun even when nothing has changed.
        #[arg(long)]
        force: bool,
    },

    /// Print the names a sorted raw directory would receive.
    Classify {
        /// Sorted raw directory (`dcm/` or `parrec/` of a session).
        raw_dir: Utf8PathBuf,

        /// Raw data format.
        #[arg(long, value_enum, default_value_t = Format::Dicom)]
        format: Format,

        /// Name prefix.
        #[arg(long, default_value = "SERIES")]
        prefix: String,

        /// Lookup table to apply.
        #[arg(long, requires = "project")]
        lookup: Option<Utf8PathBuf>,

        /// Project whose lookup rows apply.
        #[arg(long)]
        project: Option<String>,

        /// Site whose lookup rows apply.
        #[arg(long)]
        site: Option<String>,

        /// Manual naming file to apply.
        #[arg(long)]
        manual: Option<Utf8PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of `seriesid convert`.
#[derive(Args)]
#[command(group = clap::ArgGroup::new("existing").args(["safe", "force", "reckless"]))]
#[command(group = clap::ArgGroup::new("link").args(["symlink", "hardlink"]))]
struct ConvertArgs {
    /// Directory or archive (.zip, .tar, .tar.gz, .tgz) holding the raw files.
    source: Utf8PathBuf,

    /// Root of the output tree.
    #[arg(short, long, env = "SERIESID_OUTPUT")]
    output: Utf8PathBuf,

    /// Project identifier.
    #[arg(long)]
    project: String,

    /// Subject identifier.
    #[arg(long)]
    subject: String,

    /// Session identifier.
    #[arg(long)]
    session: String,

    /// Site identifier.
    #[arg(long)]
    site: Option<String>,

    /// Raw data format.
    #[arg(long, value_enum, default_value_t = Format::Dicom)]
    format: Format,

    /// Place the session under a lower-case project directory.
    #[arg(long)]
    project_subdir: bool,

    /// Lookup table (defaults to `<output>/[<project>/]<project>-lut.csv`).
    #[arg(long)]
    lookup: Option<Utf8PathBuf>,

    /// Input hash from an earlier run; skips hashing the source.
    #[arg(long)]
    input_hash: Option<String>,

    /// If the session exists, convert into the next attempt directory.
    #[arg(long)]
    safe: bool,

    /// If the session exists, replace it when the source is unchanged.
    #[arg(long)]
    force: bool,

    /// If the session exists, replace it without checking the source.
    #[arg(long)]
    reckless: bool,

    /// Institution name, for PAR/REC sessions.
    #[arg(long)]
    institution: Option<String>,

    /// Main field strength in tesla, for PAR/REC sessions.
    #[arg(long)]
    field_strength: Option<f64>,

    /// Link source files into the session instead of copying them.
    #[arg(long)]
    symlink: bool,

    /// Hard-link source files into the session instead of copying them.
    #[arg(long)]
    hardlink: bool,

    /// Replace identifying attributes and remove the raw data afterwards.
    #[arg(long)]
    anonymize: bool,

    /// Days to shift acquisition times by when anonymizing.
    #[arg(long, requires = "anonymize", allow_negative_numbers = true, default_value_t = 0)]
    date_shift_days: i64,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

/// Raw data format.
#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum Format {
    /// DICOM files.
    Dicom,
    /// PAR/REC pairs.
    Parrec,
}

impl From<Format> for RawFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Dicom => Self::Dicom,
            Format::Parrec => Self::ParRec,
        }
    }
}

impl ConvertArgs {
    const fn existing(&self) -> ExistingSession {
        if self.reckless {
            ExistingSession::ReplaceUnchecked
        } else if self.force {
            ExistingSession::Replace
        } else if self.safe {
            ExistingSession::NewAttempt
        } else {
            ExistingSession::Fail
        }
    }

    const fn input_mode(&self) -> InputMode {
        if self.symlink {
            InputMode::Symlink
        } else if self.hardlink {
            InputMode::Hardlink
        } else {
            InputMode::Copy
        }
    }

    fn request(&self, command: String) -> ConvertRequest {
        let mut id = SessionId::new(&self.project, &self.subject, &self.session);
        if let Some(site) = &self.site {
            id = id.with_site(site);
        }
        ConvertRequest {
            project_subdir: self.project_subdir,
            lookup_path: self.lookup.clone(),
            input_hash: self.input_hash.clone(),
            existing: self.existing(),
            scanner: ScannerDefaults {
                institution: self.institution.clone(),
                field_strength: self.field_strength,
            },
            command,
            input_mode: self.input_mode(),
            anonymize: self.anonymize.then_some(Anonymization {
                date_shift_days: self.date_shift_days,
            }),
            ..ConvertRequest::new(self.source.clone(), self.output.clone(), id, self.format.into())
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},dicom=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file, or the defaults without one.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    match &cli.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}")),
        None => Ok(Config::default()),
    }
}

/// Returns the command line as recorded in provenance.
fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Converts one source directory.
fn run_convert(ctx: &RunContext, args: &ConvertArgs) -> color_eyre::Result<()> {
    let converter = Dcm2niix::new(ctx.config().convert.clone());
    let request = args.request(command_line());
    let summary = convert_session(&request, &converter, ctx)?;
    print_summary(&summary, args.json)
}

/// Updates every session, continuing past failures.
fn run_update(
    ctx: &RunContext,
    dirs: &[Utf8PathBuf],
    lookup: Option<&Utf8Path>,
    force: bool,
) -> color_eyre::Result<()> {
    let converter = Dcm2niix::new(ctx.config().convert.clone());
    let command = command_line();
    let mut failed = 0;
    for dir in dirs {
        let request = UpdateRequest {
            dir: dir.clone(),
            lookup_path: lookup.map(ToOwned::to_owned),
            force,
            command: command.clone(),
        };
        match update_session(&request, &converter, ctx) {
            Ok(UpdateOutcome::UpToDate) => info!(dir = %dir, "already up to date"),
            Ok(UpdateOutcome::Updated(summary)) => print_summary(&summary, false)?,
            Err(err) => {
                failed += 1;
                report_update_failure(dir, &err);
            }
        }
    }
    if failed > 0 {
        return Err(eyre!("{failed} of {} sessions failed to update", dirs.len()));
    }
    Ok(())
}

fn report_update_failure(dir: &Utf8Path, err: &ConvertError) {
    match err.kind() {
        FailureKind::NothingWritten => error!(dir = %dir, error = %err, "update failed"),
        FailureKind::RolledBack => {
            error!(dir = %dir, error = %err, "update failed, previous output restored");
        }
        FailureKind::RollbackFailed => error!(
            dir = %dir,
            error = %err,
            "update failed and could not be rolled back; previous output is in prev/"
        ),
    }
}

/// One line of `seriesid classify` output.
#[derive(Serialize)]
struct Classified<'a> {
    source: &'a Utf8Path,
    description: &'a str,
    name: Option<String>,
    excluded: Option<String>,
}

impl<'a> From<&'a ScanRecord> for Classified<'a> {
    fn from(record: &'a ScanRecord) -> Self {
        Self {
            source: &record.source_path,
            description: &record.series_description,
            name: record.final_name_string(),
            excluded: record.exclusion.as_ref().map(ToString::to_string),
        }
    }
}

/// Options of `seriesid classify`.
struct ClassifyOptions<'a> {
    format: Format,
    prefix: &'a str,
    lookup: Option<&'a Utf8Path>,
    project: Option<&'a str>,
    site: Option<&'a str>,
    manual: Option<&'a Utf8Path>,
    json: bool,
}

/// Names the records of a sorted directory without converting anything.
fn run_classify(ctx: &RunContext, raw_dir: &Utf8Path, opts: &ClassifyOptions<'_>) -> color_eyre::Result<()> {
    let format = RawFormat::from(opts.format);
    let mut records = match format {
        RawFormat::Dicom => load_dicom_records(raw_dir)?,
        RawFormat::ParRec => load_parrec_records(raw_dir)?,
    };
    let format_dir = Utf8Path::new(format.dir_name());
    for record in &mut records {
        record.source_path = format_dir.join(&record.source_path);
    }

    let lookup = match (opts.lookup, opts.project) {
        (Some(path), Some(project)) => load_lookup_table(path, project, opts.site)?,
        _ => LookupTable::default(),
    };
    let manual = match opts.manual {
        Some(path) => load_manual_names(path)?,
        None => ManualNames::default(),
    };
    name_records(&mut records, opts.prefix, &lookup, &manual, ctx)?;

    let rows: Vec<Classified<'_>> = records.iter().map(Classified::from).collect();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if opts.json {
        writeln!(handle, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }
    for row in &rows {
        let outcome = row
            .name
            .clone()
            .or_else(|| row.excluded.as_ref().map(|reason| format!("[{reason}]")))
            .unwrap_or_default();
        writeln!(handle, "{:<40} {:<32} {outcome}", row.source, row.description)?;
    }
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints a session summary.
fn print_summary(summary: &SessionSummary, json: bool) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        writeln!(handle, "{}", serde_json::to_string_pretty(summary)?)?;
        return Ok(());
    }

    writeln!(handle)?;
    writeln!(handle, "Session {}", summary.prefix)?;
    writeln!(handle, "========================")?;
    writeln!(handle, "Directory:        {}", summary.dir)?;
    writeln!(handle, "Files seen:       {}", summary.stats.files_seen)?;
    writeln!(handle, "  Skipped:        {}", summary.stats.files_skipped)?;
    writeln!(handle, "  Duplicates:     {}", summary.stats.duplicates_removed)?;
    writeln!(handle, "Series named:     {}", summary.naming.named)?;
    writeln!(handle, "  Filtered:       {}", summary.naming.filtered)?;
    writeln!(handle, "  Excluded:       {}", summary.naming.excluded)?;
    writeln!(handle, "Volumes written:  {}", summary.conversion.converted)?;
    writeln!(handle, "  Failed:         {}", summary.conversion.failed)?;
    writeln!(handle, "Usable files:     {:.1}%", summary.stats.usable_percent())?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Load configuration and build the run context
    let ctx = RunContext::new(build_config(&cli)?);

    // 5. Route to appropriate command
    match &cli.command {
        Commands::Convert(args) => run_convert(&ctx, args),
        Commands::Update {
            dirs,
            lookup,
            force,
        } => run_update(&ctx, dirs, lookup.as_deref(), *force),
        Commands::Classify {
            raw_dir,
            format,
            prefix,
            lookup,
            project,
            site,
            manual,
            json,
        } => run_classify(
            &ctx,
            raw_dir,
            &ClassifyOptions {
                format: *format,
                prefix: prefix.as_str(),
                lookup: lookup.as_deref(),
                project: project.as_deref(),
                site: site.as_deref(),
                manual: manual.as_deref(),
                json: *json,
            },
        ),
    }
}
