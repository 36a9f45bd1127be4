//! PAR/REC pair sorting.
//!
//! A PAR/REC session is flattened: every `.par` header with a sibling `.rec`
//! (either extension case) is moved with its data file to the top of the raw
//! directory, and everything else is removed.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use si_core::{FxHashSet, RunContext, fx_hash_set};
use tracing::{debug, info};

use crate::error::SortError;
use crate::sorter::SortReport;
use crate::walker::{FileWalker, list_dir};

/// Returns `true` if `path` has a `.par` extension in any case.
#[inline]
#[must_use]
pub fn is_par(path: &Utf8Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("par"))
}

/// Finds the data file belonging to a PAR header.
#[must_use]
pub fn rec_for(par: &Utf8Path) -> Option<Utf8PathBuf> {
    ["rec", "REC", "Rec"]
        .iter()
        .map(|ext| par.with_extension(ext))
        .find(|rec| rec.is_file())
}

fn free_stem(dir: &Utf8Path, stem: &str, par: &Utf8Path, taken: &FxHashSet<String>) -> String {
    let is_free = |candidate: &str| {
        let target = dir.join(format!("{candidate}.par"));
        !taken.contains(candidate) && (target == par || !target.exists())
    };
    if is_free(stem) {
        return stem.to_owned();
    }
    (1_u32..)
        .map(|n| format!("{stem}_{n}"))
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| stem.to_owned())
}

/// Sorts a raw PAR/REC directory in place.
///
/// Headers keep their stem; clashing stems from different subdirectories
/// get a numeric suffix. Header extensions are normalized to `.par` and
/// `.rec`.
///
/// # Errors
///
/// Returns [`SortError::NoValidFiles`] if no complete pair exists and
/// [`SortError::Io`] if a move or removal fails.
pub fn sort_parrec(dir: &Utf8Path, ctx: &RunContext) -> Result<SortReport, SortError> {
    info!(dir = %dir, "sorting PAR/REC files");
    let paths = FileWalker::new(dir)?
        .with_follow_links(ctx.config().sort.follow_links)
        .collect_paths()?;

    let mut pairs = Vec::new();
    let mut skipped = Vec::new();
    for path in &paths {
        ctx.stats().file_seen();
        if !is_par(path) {
            continue;
        }
        match rec_for(path) {
            Some(rec) => pairs.push((path.clone(), rec)),
            None => {
                debug!(path = %path, "PAR header without data file");
                ctx.stats().file_skipped();
                skipped.push(path.clone());
            }
        }
    }
    if pairs.is_empty() {
        return Err(SortError::NoValidFiles(dir.to_owned()));
    }

    let mut stems: FxHashSet<String> = fx_hash_set();
    let mut kept: FxHashSet<Utf8PathBuf> = fx_hash_set();
    for (par, rec) in &pairs {
        let stem = par.file_stem().unwrap_or("series");
        let stem = free_stem(dir, stem, par, &stems);
        for (src, ext) in [(par, "par"), (rec, "rec")] {
            let dest = dir.join(format!("{stem}.{ext}"));
            if *src != dest {
                fs::rename(src, &dest).map_err(|e| SortError::io("move", src.as_path(), e))?;
            }
            kept.insert(dest);
        }
        stems.insert(stem);
    }

    for entry in list_dir(dir)? {
        if !kept.contains(&entry) {
            let result = if entry.is_dir() {
                fs::remove_dir_all(&entry)
            } else {
                fs::remove_file(&entry)
            };
            result.map_err(|e| SortError::io("remove", &entry, e))?;
        }
    }

    let mut series: Vec<String> = stems.into_iter().collect();
    series.sort();
    ctx.stats().series_found(series.len() as u64);
    info!(series = series.len(), "sorting complete");
    Ok(SortReport {
        files_kept: kept.len(),
        series,
        skipped,
        duplicates_removed: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use si_core::Config;
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_is_par() {
        assert!(is_par(Utf8Path::new("a/b.PAR")));
        assert!(is_par(Utf8Path::new("b.par")));
        assert!(!is_par(Utf8Path::new("b.rec")));
    }

    #[test]
    fn test_pairs_flattened_and_orphans_removed() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("exam/sub")).unwrap();
        fs::write(root.join("exam/T1_5_1.PAR"), "par").unwrap();
        fs::write(root.join("exam/T1_5_1.REC"), "rec").unwrap();
        fs::write(root.join("exam/sub/DTI_7_1.par"), "par").unwrap();
        fs::write(root.join("exam/sub/DTI_7_1.rec"), "rec").unwrap();
        fs::write(root.join("exam/ORPHAN_9_1.par"), "par").unwrap();
        fs::write(root.join("notes.txt"), "x").unwrap();

        let ctx = RunContext::new(Config::default());
        let report = sort_parrec(&root, &ctx).unwrap();
        assert_eq!(report.series, vec!["DTI_7_1", "T1_5_1"]);
        assert_eq!(report.skipped, vec![root.join("exam/ORPHAN_9_1.par")]);

        let names: Vec<String> = list_dir(&root)
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["DTI_7_1.par", "DTI_7_1.rec", "T1_5_1.par", "T1_5_1.rec"]);

        let again = sort_parrec(&root, &ctx).unwrap();
        assert_eq!(again.series, report.series);
    }

    #[test]
    fn test_clashing_stems_get_suffix() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        for sub in ["a", "b"] {
            fs::create_dir_all(root.join(sub)).unwrap();
            fs::write(root.join(sub).join("S_1_1.par"), sub).unwrap();
            fs::write(root.join(sub).join("S_1_1.rec"), sub).unwrap();
        }
        let ctx = RunContext::new(Config::default());
        let report = sort_parrec(&root, &ctx).unwrap();
        assert_eq!(report.series, vec!["S_1_1", "S_1_1_1"]);
        assert_eq!(fs::read_to_string(root.join("S_1_1_1.rec")).unwrap(), "b");
    }

    #[test]
    fn test_no_pairs_is_error() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::write(root.join("x.par"), "par").unwrap();
        let ctx = RunContext::new(Config::default());
        assert!(sort_parrec(&root, &ctx).unwrap_err().is_empty_input());
    }
}
