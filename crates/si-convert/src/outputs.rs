//! Converter output bookkeeping.
//!
//! A converter invoked with one base name may write several volumes, telling
//! them apart with its own suffixes (`_e2`, `_ph`, `_t3`, ...). This module
//! drops the byproducts, then pairs each remaining output with the record
//! whose name suffix tags describe the same volume.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use si_core::{ComplexComponent, FxHashMap, NameExtra, SeriesName};
use si_sorter::list_dir;
use tracing::debug;

use crate::error::ConvertError;

/// Sorted suffix tags identifying one volume of a group.
pub type TagSet = Vec<String>;

const SUFFIX_MAP: [(&str, &str); 5] = [
    ("_e", "_ECHO"),
    ("_ph", "_PHA"),
    ("_real", "_REA"),
    ("_imaginary", "_IMA"),
    ("_t", "_DYN"),
];

const NON_MAGNITUDE: [&str; 3] = ["PHA", "REA", "IMA"];

/// Returns `path` with `suffix` appended to its file name.
pub(crate) fn with_suffix(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_owned();
    name.push_str(suffix);
    path.with_file_name(name)
}

fn remove_if_exists(path: &Utf8Path) -> Result<(), ConvertError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ConvertError::io("remove", path, err)),
    }
}

/// Returns `true` if `file_name` is a file the converter wrote for `stem`.
///
/// That is `stem`, an optional run of letters, digits and underscores, then
/// an extension.
fn is_created_by(file_name: &str, stem: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(stem) else {
        return false;
    };
    let Some((tag, ext)) = rest.split_once('.') else {
        return false;
    };
    !ext.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Deletes every file the converter wrote for `output`.
///
/// # Errors
///
/// Returns [`ConvertError::Io`] if the directory cannot be listed or a
/// file cannot be removed.
pub fn remove_created_files(output: &Utf8Path) -> Result<(), ConvertError> {
    let (Some(dir), Some(stem)) = (output.parent(), output.file_name()) else {
        return Ok(());
    };
    if !dir.is_dir() {
        return Ok(());
    }
    for path in list_dir(dir)? {
        if path.file_name().is_some_and(|name| is_created_by(name, stem)) {
            debug!(path = %path, "removing converter output");
            remove_if_exists(&path)?;
        }
    }
    Ok(())
}

fn sidecar_has_echo_time(sidecar: &Utf8Path) -> Result<bool, ConvertError> {
    let text = match std::fs::read_to_string(sidecar) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(ConvertError::io("read", sidecar, err)),
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| ConvertError::json(sidecar, err))?;
    Ok(value.get("EchoTime").is_some())
}

/// Drops byproduct volumes and the converter's own sidecars.
///
/// An echo output (`_e` in its name) whose sidecar lacks `EchoTime` is not a
/// real echo. An output named like another output plus one lower-case letter
/// is a split copy of that output. Both are deleted. Every converter sidecar
/// is deleted after it has been checked.
///
/// # Errors
///
/// Returns [`ConvertError::Io`] or [`ConvertError::Json`] if a sidecar
/// cannot be read or a file cannot be removed.
pub fn drop_spurious_outputs(
    outputs: Vec<Utf8PathBuf>,
    volume_ext: &str,
) -> Result<Vec<Utf8PathBuf>, ConvertError> {
    let names: Vec<&str> = outputs
        .iter()
        .map(|path| path.file_name().unwrap_or_default())
        .collect();
    let mut keep = Vec::with_capacity(outputs.len());
    for (index, output) in outputs.iter().enumerate() {
        let name = names[index];
        let sidecar = with_suffix(output, ".json");
        let mut spurious = name.contains("_e") && !sidecar_has_echo_time(&sidecar)?;
        if !spurious {
            let mut chars = name.chars();
            spurious = chars.next_back().is_some_and(|c| c.is_ascii_lowercase())
                && names.contains(&chars.as_str());
        }
        if spurious {
            debug!(output = %output, "dropping spurious converter output");
            remove_if_exists(&with_suffix(output, volume_ext))?;
        } else {
            keep.push(index);
        }
        remove_if_exists(&sidecar)?;
    }
    Ok(keep.into_iter().map(|index| outputs[index].clone()).collect())
}

fn numbered(token: &str, prefix: &str) -> Option<u32> {
    token.strip_prefix(prefix)?.parse().ok()
}

/// Replaces the numbers after `prefix` with their 1-based rank.
fn renumber(suffixes: &mut [Vec<String>], prefix: &str) {
    let mut numbers: Vec<u32> = suffixes
        .iter()
        .flatten()
        .filter_map(|token| numbered(token, prefix))
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    for token in suffixes.iter_mut().flatten() {
        let rank = numbered(token, prefix).and_then(|n| numbers.binary_search(&n).ok());
        if let Some(rank) = rank {
            *token = format!("{prefix}{}", rank + 1);
        }
    }
}

/// Translates converter suffixes into name suffix tags.
///
/// `base` is the name the converter was given. With `add_mag`, or when any
/// output is a phase, real or imaginary image, every other output is tagged
/// `MAG`. Echo and dynamic numbers become ranks so that they line up with
/// the resolver's numbering.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use si_convert::output_tags;
///
/// let outputs = [Utf8PathBuf::from("/nii/B_e2"), Utf8PathBuf::from("/nii/B_e5_ph")];
/// let tags = output_tags(&outputs, "B", false);
/// assert_eq!(tags, vec![vec!["ECHO1", "MAG"], vec!["ECHO2", "PHA"]]);
/// ```
#[must_use]
pub fn output_tags(outputs: &[Utf8PathBuf], base: &str, add_mag: bool) -> Vec<TagSet> {
    let mut suffixes: Vec<Vec<String>> = outputs
        .iter()
        .map(|output| {
            let mut suffix = output.file_name().unwrap_or_default().replace(base, "");
            for (from, to) in SUFFIX_MAP {
                suffix = suffix.replace(from, to);
            }
            suffix
                .split('_')
                .filter(|token| !token.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .collect();

    let is_non_magnitude =
        |tokens: &Vec<String>| tokens.iter().any(|t| NON_MAGNITUDE.contains(&t.as_str()));
    if add_mag || suffixes.iter().any(is_non_magnitude) {
        for tokens in &mut suffixes {
            if !is_non_magnitude(tokens) {
                tokens.push("MAG".to_owned());
            }
        }
    }
    renumber(&mut suffixes, "DYN");
    renumber(&mut suffixes, "ECHO");
    for tokens in &mut suffixes {
        tokens.sort();
    }
    suffixes
}

/// Returns the tags a converter output must carry to match `name`.
///
/// Inversion ranks are written by the converter as dynamics. Returns `None`
/// when the name carries both, which no converter output can express.
#[must_use]
pub fn expected_tags(name: &SeriesName) -> Option<TagSet> {
    let has_inv = name.has_extra(|extra| matches!(extra, NameExtra::Inv(_)));
    let has_dyn = name.has_extra(|extra| extra.is_dyn());
    if has_inv && has_dyn {
        return None;
    }
    let mut tags: TagSet = name
        .extras
        .iter()
        .map(|extra| match extra {
            NameExtra::Inv(n) => format!("DYN{n}"),
            other => other.to_string(),
        })
        .collect();
    tags.sort();
    Some(tags)
}

/// Pairs converter outputs with the names of a group, in name order.
///
/// # Errors
///
/// Returns a description of the mismatch when the outputs cannot be paired
/// one-to-one; the whole group then fails.
pub fn match_outputs(
    outputs: &[Utf8PathBuf],
    names: &[&SeriesName],
) -> Result<Vec<Utf8PathBuf>, String> {
    if outputs.len() != names.len() {
        return Err(format!(
            "converter wrote {} outputs, expected {}",
            outputs.len(),
            names.len()
        ));
    }
    let Some(first) = names.first() else {
        return Ok(Vec::new());
    };
    if names.len() == 1 {
        return Ok(outputs.to_vec());
    }

    let need_mag = names
        .iter()
        .any(|name| name.has_extra(|e| *e == NameExtra::Complex(ComplexComponent::Magnitude)));
    let tags = output_tags(outputs, &first.to_string(), need_mag);
    let mut by_tags: FxHashMap<&TagSet, &Utf8PathBuf> = FxHashMap::default();
    for (tag_set, output) in tags.iter().zip(outputs) {
        if by_tags.insert(tag_set, output).is_some() {
            return Err(format!("two outputs share suffix tags {tag_set:?}"));
        }
    }

    names
        .iter()
        .map(|name| {
            let expected = expected_tags(name)
                .ok_or_else(|| format!("{name} mixes inversion and dynamic tags"))?;
            by_tags
                .get(&expected)
                .map(|output| (*output).clone())
                .ok_or_else(|| format!("no output carries suffix tags {expected:?} for {name}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn name(text: &str) -> SeriesName {
        text.parse().unwrap()
    }

    const BASE: &str = "P_01-01_BRAIN-T2STAR-GRE-2D-AXIAL-PRE";

    #[test]
    fn test_is_created_by() {
        assert!(is_created_by("A.nii.gz", "A"));
        assert!(is_created_by("A_e2.json", "A"));
        assert!(is_created_by("A_ADC.nii.gz", "A"));
        assert!(!is_created_by("A", "A"));
        assert!(!is_created_by("A-ECHO1.nii.gz", "A"));
        assert!(!is_created_by("B.nii.gz", "A"));
    }

    #[test]
    fn test_remove_created_files() {
        let dir = TempDir::new().unwrap();
        let nii = root(&dir);
        for file in ["A.nii.gz", "A.json", "A_e2.nii.gz", "AB-X.nii.gz", "C.nii.gz"] {
            fs::write(nii.join(file), b"x").unwrap();
        }
        remove_created_files(&nii.join("A")).unwrap();
        let mut left: Vec<String> = fs::read_dir(&nii)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["AB-X.nii.gz", "C.nii.gz"]);
    }

    #[test]
    fn test_drop_spurious_outputs() {
        let dir = TempDir::new().unwrap();
        let nii = root(&dir);
        for stem in ["A_e1", "A_e2", "B"] {
            fs::write(nii.join(format!("{stem}.nii.gz")), b"x").unwrap();
        }
        fs::write(nii.join("A_e1.json"), r#"{"EchoTime": 0.008}"#).unwrap();
        fs::write(nii.join("A_e2.json"), r#"{"RepetitionTime": 2.0}"#).unwrap();
        fs::write(nii.join("B.json"), "{}").unwrap();

        let outputs = ["A_e1", "A_e2", "B"].map(|stem| nii.join(stem)).to_vec();
        let kept = drop_spurious_outputs(outputs, ".nii.gz").unwrap();
        assert_eq!(kept, vec![nii.join("A_e1"), nii.join("B")]);
        assert!(!nii.join("A_e2.nii.gz").exists());
        assert!(nii.join("A_e1.nii.gz").exists());
        assert!(!nii.join("A_e1.json").exists());
        assert!(!nii.join("B.json").exists());
    }

    #[test]
    fn test_split_copy_dropped() {
        let dir = TempDir::new().unwrap();
        let nii = root(&dir);
        for stem in ["C", "Ca"] {
            fs::write(nii.join(format!("{stem}.nii.gz")), b"x").unwrap();
        }
        let kept = drop_spurious_outputs(vec![nii.join("C"), nii.join("Ca")], ".nii.gz").unwrap();
        assert_eq!(kept, vec![nii.join("C")]);
        assert!(!nii.join("Ca.nii.gz").exists());
    }

    #[test]
    fn test_output_tags_renumber_dynamics() {
        let outputs = ["B_t300", "B_t1200", "B_t50"].map(|s| Utf8PathBuf::from(format!("/n/{s}")));
        let tags = output_tags(&outputs, "B", false);
        assert_eq!(tags, vec![vec!["DYN2"], vec!["DYN3"], vec!["DYN1"]]);
    }

    #[test]
    fn test_output_tags_complex() {
        let outputs = ["B", "B_real", "B_imaginary"].map(|s| Utf8PathBuf::from(format!("/n/{s}")));
        let tags = output_tags(&outputs, "B", false);
        assert_eq!(tags, vec![vec!["MAG"], vec!["REA"], vec!["IMA"]]);
    }

    #[test]
    fn test_expected_tags() {
        let n = name(&format!("{BASE}-INV2-MAG"));
        assert_eq!(expected_tags(&n), Some(vec!["DYN2".to_owned(), "MAG".to_owned()]));
        assert_eq!(expected_tags(&name(BASE)), Some(Vec::new()));
        assert_eq!(expected_tags(&name(&format!("{BASE}-INV1-DYN1"))), None);
    }

    #[test]
    fn test_match_two_echoes() {
        let echo1 = name(&format!("{BASE}-ECHO1"));
        let echo2 = name(&format!("{BASE}-ECHO2"));
        let outputs = vec![
            Utf8PathBuf::from(format!("/n/{echo1}_e2")),
            Utf8PathBuf::from(format!("/n/{echo1}_e1")),
        ];
        let matched = match_outputs(&outputs, &[&echo1, &echo2]).unwrap();
        assert_eq!(matched, vec![outputs[1].clone(), outputs[0].clone()]);
    }

    #[test]
    fn test_match_single_output() {
        let only = name(BASE);
        let outputs = vec![Utf8PathBuf::from("/n/anything")];
        assert_eq!(match_outputs(&outputs, &[&only]).unwrap(), outputs);
    }

    #[test]
    fn test_match_failures() {
        let echo1 = name(&format!("{BASE}-ECHO1"));
        let echo2 = name(&format!("{BASE}-ECHO2"));
        let one = vec![Utf8PathBuf::from("/n/x")];
        assert!(match_outputs(&one, &[&echo1, &echo2]).is_err());

        let unmatched = vec![
            Utf8PathBuf::from(format!("/n/{echo1}_c1")),
            Utf8PathBuf::from(format!("/n/{echo1}_c2")),
        ];
        let err = match_outputs(&unmatched, &[&echo1, &echo2]).unwrap_err();
        assert!(err.contains("ECHO1"));

        let duplicated = vec![
            Utf8PathBuf::from(format!("/n/{echo1}_e1")),
            Utf8PathBuf::from(format!("/n/{echo1}_e1")),
        ];
        assert!(match_outputs(&duplicated, &[&echo1, &echo2]).is_err());
    }
}
