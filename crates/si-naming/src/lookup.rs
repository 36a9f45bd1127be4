//! Project lookup table loading.
//!
//! The table is a CSV file shared by every session of a project:
//!
//! ```text
//! Project,Site,InstitutionName,SeriesDescription,OutputFilename
//! STUDY,NONE,NONE,AX FLAIR,BRAIN-FLAIR-IRFSE-2D-AXIAL
//! STUDY,2,General Hospital,3-plane,False
//! ```
//!
//! Only rows for the requested project and site are kept.

use std::fs;

use camino::Utf8Path;
use si_core::{LookupTable, NameOverride, WILDCARD_INSTITUTION};
use tracing::{debug, info};

use crate::error::NamingError;

/// Column headers, in file order.
pub const LOOKUP_COLUMNS: [&str; 5] = [
    "Project",
    "Site",
    "InstitutionName",
    "SeriesDescription",
    "OutputFilename",
];

/// Returns `true` if a row's site cell selects `site`.
///
/// `NONE` (any case) stands for "no site". Integer sites compare by value,
/// so `02` selects site `2`.
fn site_matches(cell: &str, site: Option<&str>) -> bool {
    let cell = cell.trim();
    let wanted = site.unwrap_or(WILDCARD_INSTITUTION);
    if cell.eq_ignore_ascii_case(WILDCARD_INSTITUTION) {
        return wanted.eq_ignore_ascii_case(WILDCARD_INSTITUTION);
    }
    match (cell.parse::<i64>(), wanted.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => cell == wanted,
    }
}

fn column(headers: &csv::StringRecord, path: &Utf8Path, name: &'static str) -> Result<usize, NamingError> {
    headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| NamingError::MissingColumn {
            path: path.to_owned(),
            column: name,
        })
}

/// Creates an empty lookup table file holding only the header row.
///
/// # Errors
///
/// Returns [`NamingError::Io`] if the file cannot be written.
pub fn create_lookup_table(path: &Utf8Path) -> Result<(), NamingError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| NamingError::io(parent, e))?;
    }
    fs::write(path, format!("{}\n", LOOKUP_COLUMNS.join(","))).map_err(|e| NamingError::io(path, e))
}

/// Loads the rows of a lookup table that apply to one project and site.
///
/// A missing file is created with only the header row, giving an empty
/// table.
///
/// # Errors
///
/// - [`NamingError::Csv`] / [`NamingError::MissingColumn`] for a malformed
///   file
/// - [`NamingError::DuplicateLookup`] if two selected rows share an
///   institution and description
/// - [`NamingError::InvalidName`] if an `OutputFilename` holds an unknown
///   token
pub fn load_lookup_table(
    path: &Utf8Path,
    project: &str,
    site: Option<&str>,
) -> Result<LookupTable, NamingError> {
    if !path.exists() {
        info!(path = %path, "lookup table not found, creating an empty one");
        create_lookup_table(path)?;
        return Ok(LookupTable::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| NamingError::csv(path, e))?;
    let headers = reader.headers().map_err(|e| NamingError::csv(path, e))?.clone();
    let [project_col, site_col, inst_col, desc_col, name_col] =
        LOOKUP_COLUMNS.map(|name| column(&headers, path, name));
    let (project_col, site_col, inst_col, desc_col, name_col) =
        (project_col?, site_col?, inst_col?, desc_col?, name_col?);

    let mut table = LookupTable::default();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| NamingError::csv(path, e))?;
        let cell = |col: usize| row.get(col).unwrap_or_default();
        if !cell(project_col).trim().eq_ignore_ascii_case(project)
            || !site_matches(cell(site_col), site)
        {
            continue;
        }

        let institution = cell(inst_col);
        let description = cell(desc_col);
        let value = NameOverride::parse_cell(cell(name_col)).map_err(|source| {
            NamingError::InvalidName {
                path: path.to_owned(),
                row: index + 1,
                source,
            }
        })?;
        if !table.insert(institution, description, value) {
            return Err(NamingError::DuplicateLookup {
                path: path.to_owned(),
                institution: institution.to_owned(),
                description: description.to_owned(),
            });
        }
    }
    debug!(path = %path, project, entries = table.len(), "loaded lookup table");
    Ok(table)
}
