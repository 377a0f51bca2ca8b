//! Filesystem helpers shared by the sheetlog crates.
//!
//! Documents are replaced atomically so a crash mid-save never leaves a
//! half-written workbook behind:
//! - write to a temp file in the destination directory (no cross-device rename)
//! - flush + `sync_all`
//! - persist over the destination with replace semantics

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[derive(Debug)]
pub enum AtomicWriteError<E> {
    Io(io::Error),
    Writer(E),
}

impl<E> From<io::Error> for AtomicWriteError<E> {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AtomicWriteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicWriteError::Io(err) => write!(f, "io error: {err}"),
            AtomicWriteError::Writer(err) => write!(f, "write error: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AtomicWriteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtomicWriteError::Io(err) => Some(err),
            AtomicWriteError::Writer(err) => Some(err),
        }
    }
}

/// Directory a path lives in; bare file names resolve to `.`.
pub fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Create `path`'s parent directory (recursively) when it is missing.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    let dir = parent_dir_or_dot(path);
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}

/// Atomically replace `dest` with whatever `write_fn` writes.
///
/// If `write_fn` fails, `dest` is left untouched and the temp file is removed.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    ensure_parent_dir(dest)?;

    let mut tmp = NamedTempFile::new_in(parent_dir_or_dot(dest))?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|err| AtomicWriteError::Io(err.error))?;

    // Best-effort: the file is already in place.
    let _ = sync_parent_dir(dest);

    Ok(out)
}

/// Convenience helper for atomically writing a full byte slice to disk.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write(dest, |file| file.write_all(bytes)).map_err(|err| match err {
        AtomicWriteError::Io(err) | AtomicWriteError::Writer(err) => err,
    })
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    File::open(parent_dir_or_dot(path))?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_missing_directories() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("a").join("b").join("out.xlsx");

        atomic_write_bytes(&dest, b"hello").expect("atomic write");
        assert_eq!(std::fs::read(&dest).expect("read file"), b"hello");
    }

    #[test]
    fn atomic_write_does_not_clobber_existing_file_on_write_error() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("existing.xlsx");
        std::fs::write(&dest, b"sentinel").expect("write sentinel");

        let err = atomic_write(&dest, |file| {
            file.write_all(b"partial").expect("write to temp file");
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated write failure"))
        })
        .expect_err("write_fn error should propagate");

        assert_eq!(std::fs::read(&dest).expect("read dest"), b"sentinel", "{err}");
        let remaining: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(remaining, vec![dest]);
    }

    #[test]
    fn ensure_parent_dir_fails_when_a_file_blocks_the_path() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let blocker = tmp.path().join("a");
        std::fs::write(&blocker, b"not a dir").expect("write blocker");

        assert!(ensure_parent_dir(&blocker.join("b").join("out.xlsx")).is_err());
        assert!(ensure_parent_dir(&tmp.path().join("ok.xlsx")).is_ok());
    }
}
