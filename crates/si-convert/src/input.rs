//! Staging the source into a session's raw directory.
//!
//! A source is either a directory, which is copied or linked file by file,
//! or an archive (`.zip`, `.tar`, `.tar.gz`, `.tgz`), which is extracted.
//! The source itself is never modified.

use std::fs::{self, File};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use si_sorter::FileWalker;
use tracing::{info, warn};

use crate::error::ConvertError;

/// How the files of a source directory reach the raw directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Copy every file.
    #[default]
    Copy,
    /// Create symbolic links to the source files.
    Symlink,
    /// Create hard links to the source files.
    Hardlink,
}

/// Supported source archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A zip file.
    Zip,
    /// An uncompressed tar file.
    Tar,
    /// A gzip-compressed tar file.
    TarGz,
}

impl ArchiveKind {
    /// Recognizes an archive by its file name, ignoring case.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use si_convert::ArchiveKind;
    ///
    /// assert_eq!(ArchiveKind::detect(Utf8Path::new("exam.TGZ")), Some(ArchiveKind::TarGz));
    /// assert_eq!(ArchiveKind::detect(Utf8Path::new("exam.zip")), Some(ArchiveKind::Zip));
    /// assert_eq!(ArchiveKind::detect(Utf8Path::new("exam.rar")), None);
    /// ```
    #[must_use]
    pub fn detect(path: &Utf8Path) -> Option<Self> {
        let name = path.file_name()?.to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    fn extract(self, archive: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
        let file = File::open(archive)?;
        match self {
            Self::Zip => zip::ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(dest))
                .map_err(io::Error::other),
            Self::Tar => tar::Archive::new(file).unpack(dest),
            Self::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(dest),
        }
    }
}

/// Returns the files that make up `source`, sorted.
///
/// A directory yields every file below it; an archive yields itself.
///
/// # Errors
///
/// Returns [`ConvertError::UnsupportedSource`] if `source` is neither a
/// directory nor a supported archive, and [`ConvertError::Sort`] if the
/// directory cannot be walked.
pub fn source_files(source: &Utf8Path, follow_links: bool) -> Result<Vec<Utf8PathBuf>, ConvertError> {
    if source.is_dir() {
        Ok(FileWalker::new(source)?
            .with_follow_links(follow_links)
            .collect_paths()?)
    } else if source.is_file() && ArchiveKind::detect(source).is_some() {
        Ok(vec![source.to_owned()])
    } else {
        Err(ConvertError::UnsupportedSource(source.to_owned()))
    }
}

#[cfg(unix)]
fn symlink_file(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn place_file(file: &Utf8Path, target: &Utf8Path, mode: InputMode) -> Result<(), ConvertError> {
    match mode {
        InputMode::Copy => fs::copy(file, target)
            .map(drop)
            .map_err(|err| ConvertError::io("copy", file, err)),
        InputMode::Symlink => {
            let absolute = file
                .canonicalize_utf8()
                .map_err(|err| ConvertError::io("resolve", file, err))?;
            symlink_file(&absolute, target).map_err(|err| ConvertError::io("link", file, err))
        }
        InputMode::Hardlink => {
            fs::hard_link(file, target).map_err(|err| ConvertError::io("link", file, err))
        }
    }
}

/// Puts the content of `source` into `dest`.
///
/// `files` is the result of [`source_files`]. Directory sources keep their
/// relative layout; archives are extracted, ignoring `mode`.
///
/// # Errors
///
/// Returns [`ConvertError::Io`] if a file cannot be placed or the archive
/// cannot be extracted.
pub fn stage_input(
    source: &Utf8Path,
    files: &[Utf8PathBuf],
    dest: &Utf8Path,
    mode: InputMode,
) -> Result<(), ConvertError> {
    fs::create_dir_all(dest).map_err(|err| ConvertError::io("create directory", dest, err))?;
    if let Some(kind) = ArchiveKind::detect(source).filter(|_| source.is_file()) {
        if mode != InputMode::Copy {
            warn!(?mode, "archive sources are always extracted");
        }
        info!(archive = %source, ?kind, "extracting archive");
        return kind
            .extract(source, dest)
            .map_err(|err| ConvertError::io("extract", source, err));
    }

    for file in files {
        let Ok(relative) = file.strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ConvertError::io("create directory", parent, err))?;
        }
        place_file(file, &target, mode)?;
    }
    info!(files = files.len(), ?mode, "source staged");
    Ok(())
}
