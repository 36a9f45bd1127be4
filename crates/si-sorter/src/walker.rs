//! Directory traversal for raw scan files.
//!
//! This module provides [`FileWalker`], which uses the `ignore` crate to walk
//! a raw data directory. Unlike a source-tree walk, every standard filter is
//! off: DICOM files often have no extension, may be hidden, and must not be
//! dropped because of a stray `.gitignore`.

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;

use crate::error::SortError;

/// Walks a raw directory and collects file paths.
///
/// Paths are returned sorted so that callers see a stable order regardless
/// of how the filesystem enumerates entries.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use si_sorter::FileWalker;
///
/// let walker = FileWalker::new(Utf8Path::new("session/dcm"))?;
/// for path in walker.collect_paths()? {
///     println!("{path}");
/// }
/// # Ok::<(), si_sorter::SortError>(())
/// ```
#[derive(Debug)]
pub struct FileWalker {
    root: Utf8PathBuf,
    follow_links: bool,
    max_depth: Option<usize>,
}

impl FileWalker {
    /// Creates a walker for `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Io`] if `root` is not an existing directory.
    pub fn new(root: &Utf8Path) -> Result<Self, SortError> {
        if !root.is_dir() {
            return Err(SortError::io(
                "walk",
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(Self {
            root: root.to_owned(),
            follow_links: false,
            max_depth: None,
        })
    }

    /// Configures whether to follow symbolic links.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Limits the walk depth; `1` lists only the root's direct children.
    #[must_use]
    pub const fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Collects every regular file below the root, sorted.
    ///
    /// A symbolic link to a file counts as a file even when links are not
    /// followed; links to directories are only descended into when they are.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Walk`] if traversal fails and
    /// [`SortError::NonUtf8Path`] for a non-UTF-8 path.
    pub fn collect_paths(&self) -> Result<Vec<Utf8PathBuf>, SortError> {
        let mut paths = Vec::new();
        for result in self.build_walker() {
            let entry = result?;
            let is_file = entry
                .file_type()
                .is_some_and(|ft| ft.is_file() || (ft.is_symlink() && entry.path().is_file()));
            if !is_file {
                continue;
            }
            let path = entry.path();
            let utf8_path =
                Utf8Path::from_path(path).ok_or_else(|| SortError::NonUtf8Path(path.to_owned()))?;
            paths.push(utf8_path.to_owned());
        }
        paths.sort();
        Ok(paths)
    }

    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(self.follow_links)
            .max_depth(self.max_depth)
            .threads(1)
            .build()
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

/// Lists the direct children of `dir`, sorted by name.
///
/// # Errors
///
/// Returns [`SortError::Io`] if the directory cannot be read or holds a
/// non-UTF-8 name.
pub fn list_dir(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SortError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|e| SortError::io("list", dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SortError::io("list", dir, e))?;
        paths.push(entry.into_path());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_walker_rejects_missing_root() {
        assert!(FileWalker::new(Utf8Path::new("/nonexistent/raw")).is_err());
    }

    #[test]
    fn test_collects_hidden_and_extensionless_files() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("IM0001"), b"x").unwrap();
        fs::write(root.join(".hidden"), b"x").unwrap();
        fs::write(root.join("a/b/IM0002"), b"x").unwrap();
        fs::write(root.join(".gitignore"), b"*\n").unwrap();

        let paths = FileWalker::new(&root).unwrap().collect_paths().unwrap();
        let names: Vec<&str> = paths.iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"IM0002"));
        assert!(names.contains(&".hidden"));
    }

    #[test]
    fn test_max_depth_limits_walk() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("top"), b"x").unwrap();
        fs::write(root.join("sub/deep"), b"x").unwrap();

        let paths = FileWalker::new(&root)
            .unwrap()
            .with_max_depth(1)
            .collect_paths()
            .unwrap();
        assert_eq!(paths, vec![root.join("top")]);
    }

    #[test]
    fn test_list_dir_sorted() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::write(root.join("b"), b"x").unwrap();
        fs::create_dir(root.join("a")).unwrap();
        assert_eq!(list_dir(&root).unwrap(), vec![root.join("a"), root.join("b")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_links_to_files_are_collected() {
        let dir = TempDir::new().unwrap();
        let root = root(&dir);
        fs::create_dir_all(root.join("data/sub")).unwrap();
        fs::write(root.join("data/sub/IM0001"), b"x").unwrap();
        fs::create_dir(root.join("raw")).unwrap();
        std::os::unix::fs::symlink(root.join("data/sub/IM0001"), root.join("raw/IM0001")).unwrap();
        std::os::unix::fs::symlink(root.join("data/sub"), root.join("raw/sub")).unwrap();

        let raw = root.join("raw");
        let paths = FileWalker::new(&raw).unwrap().collect_paths().unwrap();
        assert_eq!(paths, vec![raw.join("IM0001")]);

        let followed = FileWalker::new(&raw)
            .unwrap()
            .with_follow_links(true)
            .collect_paths()
            .unwrap();
        assert_eq!(followed, vec![raw.join("IM0001"), raw.join("sub/IM0001")]);
    }
}
