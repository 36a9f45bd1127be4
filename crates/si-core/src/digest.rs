//! SHA-256 content hashing for raw inputs and produced outputs.
//!
//! Hashes are lower-case hex strings. [`hash_file_set`] is the session input
//! hash: it does not depend on enumeration order or on file names, only on
//! the multiset of file contents.

use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;
use sha2::{Digest, Sha256};

const BUF_SIZE: usize = 256 * 1024;

/// Returns the hex SHA-256 digest of `bytes`.
///
/// # Examples
///
/// ```
/// let hash = si_core::digest::hash_bytes(b"abc");
/// assert_eq!(
///     hash,
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Returns the hex SHA-256 digest of a file's content.
///
/// When `include_name` is set, the file name is hashed ahead of the content so
/// that renaming the file changes the digest.
///
/// # Errors
///
/// Returns any I/O error raised while opening or reading the file.
pub fn hash_file(path: &Utf8Path, include_name: bool) -> io::Result<String> {
    let mut hasher = Sha256::new();
    if include_name {
        hasher.update(path.file_name().unwrap_or_default().as_bytes());
    }
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Returns an order- and name-independent digest over a set of files.
///
/// Each file is hashed on its own, the digests are sorted, and the sorted
/// concatenation is hashed again.
///
/// # Errors
///
/// Returns the first I/O error raised while reading any file.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use si_core::digest::hash_file_set;
///
/// let dir = tempfile::tempdir().unwrap();
/// let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
/// std::fs::write(root.join("a"), b"one").unwrap();
/// std::fs::write(root.join("b"), b"two").unwrap();
///
/// let forward = hash_file_set([root.join("a"), root.join("b")].iter().map(|p| p.as_path())).unwrap();
/// let reverse = hash_file_set([root.join("b"), root.join("a")].iter().map(|p| p.as_path())).unwrap();
/// assert_eq!(forward, reverse);
/// ```
pub fn hash_file_set<'a, I>(paths: I) -> io::Result<String>
where
    I: IntoIterator<Item = &'a Utf8Path>,
{
    let mut digests = paths
        .into_iter()
        .map(|path| hash_file(path, false))
        .collect::<io::Result<Vec<_>>>()?;
    digests.sort_unstable();

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let (_dir, root) = temp_root();
        let path = root.join("data.bin");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(hash_file(&path, false).unwrap(), hash_bytes(b"hello"));
    }

    #[test]
    fn test_hash_file_with_name_differs() {
        let (_dir, root) = temp_root();
        let a = root.join("a.bin");
        let b = root.join("b.bin");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        assert_eq!(hash_file(&a, false).unwrap(), hash_file(&b, false).unwrap());
        assert_ne!(hash_file(&a, true).unwrap(), hash_file(&b, true).unwrap());
    }

    #[test]
    fn test_hash_file_set_ignores_names() {
        let (_dir, root) = temp_root();
        let first = root.join("first");
        std::fs::create_dir(&first).unwrap();
        std::fs::write(first.join("x1"), b"alpha").unwrap();
        std::fs::write(first.join("x2"), b"beta").unwrap();
        let second = root.join("second");
        std::fs::create_dir(&second).unwrap();
        std::fs::write(second.join("renamed_b"), b"beta").unwrap();
        std::fs::write(second.join("renamed_a"), b"alpha").unwrap();

        let lhs = hash_file_set([first.join("x1"), first.join("x2")].iter().map(Utf8PathBuf::as_path))
            .unwrap();
        let rhs = hash_file_set(
            [second.join("renamed_b"), second.join("renamed_a")]
                .iter()
                .map(Utf8PathBuf::as_path),
        )
        .unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_hash_file_set_detects_changed_byte() {
        let (_dir, root) = temp_root();
        let path = root.join("f");
        std::fs::write(&path, b"abcd").unwrap();
        let before = hash_file_set([path.as_path()]).unwrap();
        std::fs::write(&path, b"abce").unwrap();
        let after = hash_file_set([path.as_path()]).unwrap();
        assert_ne!(before, after);
    }
}
