//! DICOM series sorting and deduplication.
//!
//! [`sort_dicom`] restructures a raw directory in place:
//!
//! 1. Read every header in parallel, skipping unreadable or unsupported files
//! 2. Group files by `(series UID, fingerprint)`; a UID with several
//!    fingerprints becomes `uid.01`, `uid.02`, ... ordered by first instance
//!    number then fingerprint, so the result does not depend on file paths
//! 3. Groups sharing a file (multi-frame containers) merge back to the bare
//!    UID
//! 4. Move files into pre-created per-series directories and remove
//!    everything else
//! 5. Remove later copies of instances that appear more than once
//!
//! Running it again over its own output moves nothing.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use si_core::{FingerprintKey, FxHashMap, FxHashSet, RunContext};
use si_reader::{DicomFile, ReadError, dicom_fingerprint, is_duplicate, read_dicom};
use tracing::{debug, info, warn};

use crate::error::SortError;
use crate::walker::{FileWalker, list_dir};

/// Summary of one sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    /// Resulting series directory names, sorted.
    pub series: Vec<String>,
    /// Number of files kept.
    pub files_kept: usize,
    /// Files dropped as unreadable or unsupported.
    pub skipped: Vec<Utf8PathBuf>,
    /// Number of duplicate instances removed.
    pub duplicates_removed: usize,
}

#[derive(Debug)]
struct Group {
    first_instance: i64,
    files: Vec<usize>,
}

/// One target directory and the files that go into it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeriesPlan {
    id: String,
    files: Vec<usize>,
}

/// Reads headers in parallel, collecting failures.
fn read_headers(paths: &[Utf8PathBuf], ctx: &RunContext) -> (Vec<DicomFile>, Vec<ReadError>) {
    let failures: Mutex<Vec<ReadError>> = Mutex::new(Vec::new());
    let read_all = || {
        paths
            .par_iter()
            .filter_map(|path| {
                ctx.stats().file_seen();
                match read_dicom(path) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        ctx.stats().file_skipped();
                        debug!(path = %path, error = %e, "skipping file");
                        failures.lock().push(e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
    };

    let files = match ctx.config().sort.max_parallel_jobs {
        Some(jobs) => match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(read_all),
            Err(e) => {
                warn!(error = %e, "could not build thread pool, using the global one");
                read_all()
            }
        },
        None => read_all(),
    };
    (files, failures.into_inner())
}

fn plan_series(files: &[DicomFile]) -> Vec<SeriesPlan> {
    let mut groups: BTreeMap<(&str, FingerprintKey), Group> = BTreeMap::new();
    for (idx, file) in files.iter().enumerate() {
        for frame in &file.frames {
            let key = dicom_fingerprint(frame).key();
            let group = groups
                .entry((file.series_uid.as_str(), key))
                .or_insert_with(|| Group {
                    first_instance: i64::MAX,
                    files: Vec::new(),
                });
            if group.files.last() != Some(&idx) {
                group.files.push(idx);
            }
            group.first_instance = group
                .first_instance
                .min(file.instance_number.unwrap_or(i64::MAX));
        }
    }

    let mut by_uid: BTreeMap<&str, Vec<(FingerprintKey, Group)>> = BTreeMap::new();
    for ((uid, key), group) in groups {
        by_uid.entry(uid).or_default().push((key, group));
    }

    let mut plans: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (uid, mut uid_groups) in by_uid {
        uid_groups.sort_by(|(ka, a), (kb, b)| a.first_instance.cmp(&b.first_instance).then_with(|| ka.cmp(kb)));

        let mut owners: FxHashMap<usize, usize> = FxHashMap::default();
        let mut shared: FxHashSet<usize> = FxHashSet::default();
        for (gi, (_, group)) in uid_groups.iter().enumerate() {
            for file in &group.files {
                if let Some(other) = owners.insert(*file, gi) {
                    shared.insert(other);
                    shared.insert(gi);
                }
            }
        }

        for (gi, (_, group)) in uid_groups.into_iter().enumerate() {
            let id = if shared.contains(&gi) {
                uid.to_owned()
            } else {
                format!("{uid}.{:02}", gi + 1)
            };
            plans.entry(id).or_default().extend(group.files);
        }
    }

    plans
        .into_iter()
        .map(|(id, mut files)| {
            files.sort_unstable();
            files.dedup();
            SeriesPlan { id, files }
        })
        .collect()
}

/// Returns a destination for `src` inside `dir` that does not overwrite
/// another file.
fn destination(src: &Utf8Path, dir: &Utf8Path, taken: &FxHashSet<Utf8PathBuf>) -> Utf8PathBuf {
    let name = src.file_name().unwrap_or("file");
    let candidate = dir.join(name);
    if candidate == src {
        return candidate;
    }
    let free = |path: &Utf8PathBuf| !taken.contains(path) && fs::symlink_metadata(path).is_err();
    if free(&candidate) {
        return candidate;
    }
    (1_u32..)
        .map(|n| dir.join(format!("{name}_{n}")))
        .find(|path| free(path))
        .unwrap_or(candidate)
}

fn remove_path(path: &Utf8Path) -> Result<(), SortError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| SortError::io("remove", path, e))
}

/// Sorts a raw DICOM directory in place.
///
/// # Errors
///
/// Returns [`SortError::NoValidFiles`] if no file belongs to a supported
/// series, and [`SortError::Io`] or [`SortError::Walk`] on filesystem
/// failures.
pub fn sort_dicom(dir: &Utf8Path, ctx: &RunContext) -> Result<SortReport, SortError> {
    info!(dir = %dir, "sorting DICOM files");
    let paths = FileWalker::new(dir)?
        .with_follow_links(ctx.config().sort.follow_links)
        .collect_paths()?;
    let (files, failures) = read_headers(&paths, ctx);
    if !failures.is_empty() {
        warn!(count = failures.len(), "skipped unreadable or unsupported files");
    }
    if files.is_empty() {
        return Err(SortError::NoValidFiles(dir.to_owned()));
    }

    let plans = plan_series(&files);
    for plan in &plans {
        let target = dir.join(&plan.id);
        fs::create_dir_all(&target).map_err(|e| SortError::io("create", &target, e))?;
    }

    let mut kept: FxHashSet<Utf8PathBuf> = FxHashSet::default();
    let mut placed: Vec<(usize, Utf8PathBuf)> = Vec::with_capacity(files.len());
    for plan in &plans {
        let target = dir.join(&plan.id);
        for &idx in &plan.files {
            let src = &files[idx].path;
            let dest = destination(src, &target, &kept);
            if *src != dest {
                fs::rename(src, &dest).map_err(|e| SortError::io("move", src, e))?;
            }
            kept.insert(dest.clone());
            placed.push((idx, dest));
        }
    }

    let ids: FxHashSet<&str> = plans.iter().map(|p| p.id.as_str()).collect();
    for entry in list_dir(dir)? {
        if !entry.file_name().is_some_and(|name| ids.contains(name)) {
            remove_path(&entry)?;
        }
    }
    for plan in &plans {
        for entry in list_dir(&dir.join(&plan.id))? {
            if !kept.contains(&entry) {
                remove_path(&entry)?;
            }
        }
    }

    let mut duplicates_removed = 0;
    let mut offset = 0;
    for plan in &plans {
        let members = &placed[offset..offset + plan.files.len()];
        offset += plan.files.len();
        duplicates_removed += remove_duplicates(&plan.id, members, &files, ctx)?;
    }

    ctx.stats().series_found(plans.len() as u64);
    let report = SortReport {
        series: plans.into_iter().map(|p| p.id).collect(),
        files_kept: kept.len() - duplicates_removed,
        skipped: failures.iter().map(|e| e.path().clone()).collect(),
        duplicates_removed,
    };
    info!(
        series = report.series.len(),
        files = report.files_kept,
        duplicates = report.duplicates_removed,
        "sorting complete"
    );
    Ok(report)
}

/// Removes later copies of repeated instances within one series directory.
fn remove_duplicates(
    id: &str,
    members: &[(usize, Utf8PathBuf)],
    files: &[DicomFile],
    ctx: &RunContext,
) -> Result<usize, SortError> {
    let mut by_instance: BTreeMap<Option<i64>, Vec<(&str, &Utf8PathBuf)>> = BTreeMap::new();
    for (idx, path) in members {
        let file = &files[*idx];
        by_instance
            .entry(file.instance_number)
            .or_default()
            .push((file.creation.as_str(), path));
    }
    if by_instance.values().all(|copies| copies.len() < 2) {
        return Ok(0);
    }
    info!(series = id, "checking repeated instance numbers");

    let mut removed = 0;
    for mut copies in by_instance.into_values().filter(|c| c.len() > 1) {
        copies.sort();
        let mut originals: Vec<&Utf8PathBuf> = Vec::new();
        for (_, path) in copies {
            let mut duplicate = false;
            for original in &originals {
                if is_duplicate(original, path)? {
                    duplicate = true;
                    break;
                }
            }
            if duplicate {
                debug!(path = %path, "removing duplicate instance");
                fs::remove_file(path).map_err(|e| SortError::io("remove", path.as_path(), e))?;
                ctx.stats().duplicate_removed();
                removed += 1;
            } else {
                originals.push(path);
            }
        }
    }
    Ok(removed)
}
