//! Provenance records for conversion runs.
//!
//! Each run is described by one text block naming who ran what, when, on
//! which inputs and with which outputs, every file identified by its
//! SHA-256 digest. The block is appended to the session's provenance log and
//! copied next to each output as `{name}.prov`:
//!
//! ```text
//! ---
//! Id: <sha256 of the lines from Module to Command>
//! Module: seriesid:<version>
//! User: <user>
//! StartTime: <RFC 3339>
//! Duration: <HH:MM:SS>
//! Inputs:
//!   source:
//!     - <path>:sha256:<hash>
//! Outputs:
//!   <name>: <path>:sha256:<hash>
//! Parameters:
//!   <key>: <value>
//! Command: <command line>
//! ...
//! ```

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use fs2::FileExt;
use si_core::digest::hash_bytes;
use si_core::Session;
use tracing::debug;

use crate::error::ConvertError;
use crate::record::TOOL_VERSION;

/// One file named in a provenance block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceFile {
    /// Path relative to the session directory.
    pub path: Utf8PathBuf,
    /// Hex SHA-256 digest.
    pub hash: String,
}

/// A provenance block for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// `seriesid:<version>`.
    pub module: String,
    /// Who ran the conversion.
    pub user: String,
    /// When the run started.
    pub start: DateTime<Utc>,
    /// How long the run took.
    pub duration: TimeDelta,
    /// Raw file groups read.
    pub inputs: Vec<ProvenanceFile>,
    /// Volumes written, keyed by series name.
    pub outputs: Vec<(String, ProvenanceFile)>,
    /// Run parameters.
    pub parameters: Vec<(String, String)>,
    /// The command line.
    pub command: String,
}

/// Returns the name of the user running the process.
///
/// Falls back to the last component of `HOME`, then to `unknown`.
#[must_use]
pub fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|user| !user.is_empty())
        .or_else(|| {
            std::env::var("HOME").ok().and_then(|home| {
                Utf8Path::new(&home).file_name().map(ToOwned::to_owned)
            })
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn format_duration(duration: TimeDelta) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

impl Provenance {
    /// Describes a finished run over `session`.
    ///
    /// Inputs are the distinct raw groups of the session; outputs are the
    /// converted records, at `nii/{name}{volume_ext}`.
    #[must_use]
    pub fn for_session(
        session: &Session,
        volume_ext: &str,
        start: DateTime<Utc>,
        command: impl Into<String>,
        parameters: Vec<(String, String)>,
    ) -> Self {
        let mut inputs: Vec<ProvenanceFile> = Vec::new();
        for record in &session.records {
            let Some(hash) = &record.source_hash else {
                continue;
            };
            if inputs.iter().all(|input| input.path != record.source_path) {
                inputs.push(ProvenanceFile {
                    path: record.source_path.clone(),
                    hash: hash.clone(),
                });
            }
        }
        let outputs = session
            .records
            .iter()
            .filter(|record| record.converted)
            .filter_map(|record| {
                let name = record.final_name_string()?;
                let hash = record.output_hash.clone()?;
                let path = Utf8PathBuf::from(format!("nii/{name}{volume_ext}"));
                Some((name, ProvenanceFile { path, hash }))
            })
            .collect();

        Self {
            module: format!("seriesid:{TOOL_VERSION}"),
            user: current_user(),
            start,
            duration: Utc::now() - start,
            inputs,
            outputs,
            parameters,
            command: command.into(),
        }
    }

    /// Renders the lines covered by the block id.
    #[must_use]
    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Module: {}", self.module);
        let _ = writeln!(out, "User: {}", self.user);
        let _ = writeln!(
            out,
            "StartTime: {}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "Duration: {}", format_duration(self.duration));
        out.push_str("Inputs:\n");
        if !self.inputs.is_empty() {
            out.push_str("  source:\n");
            for input in &self.inputs {
                let _ = writeln!(out, "    - {}:sha256:{}", input.path, input.hash);
            }
        }
        out.push_str("Outputs:\n");
        for (name, file) in &self.outputs {
            let _ = writeln!(out, "  {name}: {}:sha256:{}", file.path, file.hash);
        }
        out.push_str("Parameters:\n");
        for (key, value) in &self.parameters {
            let _ = writeln!(out, "  {key}: {value}");
        }
        let _ = writeln!(out, "Command: {}", self.command);
        out
    }

    /// Renders the full block, including its id and document markers.
    #[must_use]
    pub fn render(&self) -> String {
        let body = self.body();
        format!("---\nId: {}\n{body}...\n", hash_bytes(body.as_bytes()))
    }

    /// Appends the block to the session log under an exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if the log cannot be opened, locked or
    /// written.
    pub fn append_to_log(&self, log: &Utf8Path) -> Result<(), ConvertError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .map_err(|err| ConvertError::io("open", log, err))?;
        FileExt::lock_exclusive(&file).map_err(|err| ConvertError::io("lock", log, err))?;
        let written = file.write_all(self.render().as_bytes());
        FileExt::unlock(&file).map_err(|err| ConvertError::io("unlock", log, err))?;
        written.map_err(|err| ConvertError::io("append to", log, err))?;
        debug!(path = %log, "provenance appended");
        Ok(())
    }

    /// Writes `{name}.prov` next to every output.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if a file cannot be written.
    pub fn write_output_files(&self, session_dir: &Utf8Path) -> Result<(), ConvertError> {
        let text = self.render();
        for (name, file) in &self.outputs {
            let dir = file
                .path
                .parent()
                .map_or_else(|| session_dir.to_owned(), |parent| session_dir.join(parent));
            let path = dir.join(format!("{name}.prov"));
            std::fs::write(&path, &text).map_err(|err| ConvertError::io("write", &path, err))?;
        }
        Ok(())
    }
}
