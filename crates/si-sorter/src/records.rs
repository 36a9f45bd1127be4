//! Record loading from a sorted raw directory.
//!
//! After sorting, every DICOM series lives in its own subdirectory and every
//! PAR/REC pair sits at the top level, so a record only needs the first
//! header of each series.

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use si_core::{FingerprintKey, ScanRecord, digest};
use si_reader::{DicomFile, dicom_fingerprint, dicom_record, read_dicom, read_par};
use tracing::{debug, info};

use crate::error::SortError;
use crate::parrec::{is_par, rec_for};
use crate::walker::list_dir;

fn relative(raw_dir: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    path.strip_prefix(raw_dir).map_or_else(|_| path.to_owned(), Utf8Path::to_owned)
}

fn hash_files(files: &[Utf8PathBuf]) -> Result<String, SortError> {
    digest::hash_file_set(files.iter().map(Utf8PathBuf::as_path)).map_err(|e| {
        let path = files.first().cloned().unwrap_or_default();
        SortError::io("hash", path, e)
    })
}

/// Splits an Enhanced MR file into one record per distinct fingerprint, in
/// first-appearance order.
fn enhanced_records(file: &DicomFile, source_path: &Utf8Path) -> Vec<ScanRecord> {
    let mut groups: Vec<(FingerprintKey, usize, u32)> = Vec::new();
    for (idx, frame) in file.frames.iter().enumerate() {
        let key = dicom_fingerprint(frame).key();
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, count)) => *count += 1,
            None => groups.push((key, idx, 1)),
        }
    }
    groups
        .into_iter()
        .enumerate()
        .map(|(i, (_, first, count))| {
            let uid = format!("{}.{i:02}", file.series_uid);
            dicom_record(&file.frames[first], &uid, source_path, count, true)
        })
        .collect()
}

fn series_records(raw_dir: &Utf8Path, series_dir: &Utf8Path) -> Result<Vec<ScanRecord>, SortError> {
    let files: Vec<Utf8PathBuf> = list_dir(series_dir)?.into_iter().filter(|p| p.is_file()).collect();
    let Some(first) = files.first() else {
        debug!(dir = %series_dir, "empty series directory");
        return Ok(Vec::new());
    };
    let file = read_dicom(first)?;
    let source_path = relative(raw_dir, series_dir);

    let mut records = if file.is_multi_frame() {
        enhanced_records(&file, &source_path)
    } else {
        let uid = series_dir.file_name().unwrap_or(file.series_uid.as_str());
        let count = u32::try_from(files.len()).unwrap_or(u32::MAX);
        vec![dicom_record(&file.frames[0], uid, &source_path, count, false)]
    };

    let hash = hash_files(&files)?;
    for record in &mut records {
        record.source_hash = Some(hash.clone());
    }
    Ok(records)
}

/// Loads one record per series from a sorted DICOM directory.
///
/// Subdirectories are visited in name order; an Enhanced MR series yields
/// one record per acquisition-setting group, each tagged as multi-frame.
///
/// # Errors
///
/// Returns [`SortError::Read`] if the first file of a series cannot be read
/// and [`SortError::Io`] if a directory cannot be listed or hashed.
pub fn load_dicom_records(raw_dir: &Utf8Path) -> Result<Vec<ScanRecord>, SortError> {
    let dirs: Vec<Utf8PathBuf> = list_dir(raw_dir)?.into_iter().filter(|p| p.is_dir()).collect();
    let records: Vec<ScanRecord> = dirs
        .par_iter()
        .map(|dir| series_records(raw_dir, dir))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();
    info!(dir = %raw_dir, records = records.len(), "loaded DICOM records");
    Ok(records)
}

/// Loads one record per PAR/REC pair from a sorted directory.
///
/// # Errors
///
/// Returns [`SortError::Read`] if a header is malformed and
/// [`SortError::Io`] if the directory cannot be listed or hashed.
pub fn load_parrec_records(raw_dir: &Utf8Path) -> Result<Vec<ScanRecord>, SortError> {
    let mut records = Vec::new();
    for par in list_dir(raw_dir)?.into_iter().filter(|p| is_par(p)) {
        let Some(rec) = rec_for(&par) else {
            debug!(path = %par, "PAR header without data file");
            continue;
        };
        let mut record = read_par(&par, &relative(raw_dir, &par))?;
        record.source_hash = Some(hash_files(&[par, rec])?);
        records.push(record);
    }
    info!(dir = %raw_dir, records = records.len(), "loaded PAR/REC records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{enhanced, mr_slice, par_text, write};
    use std::fs;
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_classic_series_record() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("1.2.3.4.01")).unwrap();
        write(mr_slice("1.2.3.4", 1, 90.0), &root.join("1.2.3.4.01/a"));
        write(mr_slice("1.2.3.4", 2, 90.0), &root.join("1.2.3.4.01/b"));

        let records = load_dicom_records(&root).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.series_uid, "1.2.3.4.01");
        assert_eq!(record.source_path, "1.2.3.4.01");
        assert_eq!(record.num_files, 2);
        assert!(!record.multi_frame);
        assert_eq!(record.echo_time, Some(90.0));
        assert!(record.source_hash.is_some());
    }

    #[test]
    fn test_hash_ignores_file_names() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        for sub in ["1.2.3.4.01", "1.2.3.4.02"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        write(mr_slice("1.2.3.4", 1, 90.0), &root.join("1.2.3.4.01/a"));
        write(mr_slice("1.2.3.4", 1, 90.0), &root.join("1.2.3.4.02/renamed"));

        let records = load_dicom_records(&root).unwrap();
        assert_eq!(records[0].source_hash, records[1].source_hash);
    }

    #[test]
    fn test_enhanced_file_splits_by_fingerprint() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("1.2.3.9")).unwrap();
        write(
            enhanced("1.2.3.9", &[10.0, 20.0, 10.0, 30.0, 40.0, 20.0]),
            &root.join("1.2.3.9/enh"),
        );

        let records = load_dicom_records(&root).unwrap();
        let uids: Vec<&str> = records.iter().map(|r| r.series_uid.as_str()).collect();
        assert_eq!(uids, vec!["1.2.3.9.00", "1.2.3.9.01", "1.2.3.9.02", "1.2.3.9.03"]);
        assert_eq!(records[0].num_files, 2);
        assert_eq!(records[2].num_files, 1);
        assert_eq!(records[1].echo_time, Some(20.0));
        assert!(records.iter().all(|r| r.multi_frame));
        assert!(records.iter().all(|r| r.source_path == "1.2.3.9"));
    }

    #[test]
    fn test_parrec_records() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::write(root.join("2.25.7.5.1.par"), par_text("T1W_3D", 3)).unwrap();
        fs::write(root.join("2.25.7.5.1.rec"), b"pixels").unwrap();
        fs::write(root.join("lonely.par"), par_text("X", 1)).unwrap();

        let records = load_parrec_records(&root).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].series_uid, "2.25.7.5.1");
        assert_eq!(records[0].source_path, "2.25.7.5.1.par");
        assert_eq!(records[0].series_description, "T1W_3D");
        assert!(records[0].source_hash.is_some());
    }
}
