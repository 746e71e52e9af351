//! The storage collaborator: directory creation, atomic rename, the
//! backup/log integrity pass and fsync, all kept to thin wrappers around
//! `std::fs` so the rest of the core can be tested against it directly.
//! Operates on a single log file plus one `~`-suffixed backup, never a
//! generation-numbered sequence of files.

use crate::error::{PersistError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling backup path for `log_path` (same directory, trailing `~`).
pub fn backup_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push("~");
    PathBuf::from(name)
}

/// `mkdir -p`.
pub fn mkdir_p(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PersistError::io("mkdir_p", dir.to_path_buf(), e))
}

/// Recovers from a half-renamed backup left by a crash mid-compaction.
///
/// - log present: leave it untouched. A stale backup (if any) is simply
///   overwritten by the next successful compaction.
/// - log absent, backup present: the compaction finished writing the
///   backup but crashed before the rename. Promote it.
/// - neither present: fresh datastore, create an empty log.
pub fn ensure_datafile_integrity(log_path: &Path) -> Result<()> {
    if log_path.exists() {
        return Ok(());
    }

    let backup = backup_path(log_path);
    if backup.exists() {
        crash_safe_rename(&backup, log_path)
    } else {
        File::create(log_path)
            .map(|_| ())
            .map_err(|e| PersistError::io("ensure_datafile_integrity", log_path.to_path_buf(), e))
    }
}

/// Renames `src` to `dst`, durable on POSIX (`rename(2)` is atomic within a
/// filesystem) and fsyncs the containing directory afterwards so the rename
/// itself survives a crash, not just the file contents.
pub fn crash_safe_rename(src: &Path, dst: &Path) -> Result<()> {
    fs::rename(src, dst).map_err(|e| PersistError::io("rename", dst.to_path_buf(), e))?;
    if let Some(parent) = dst.parent() {
        fsync_dir_best_effort(parent);
    }
    Ok(())
}

#[cfg(unix)]
fn fsync_dir_best_effort(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn fsync_dir_best_effort(_dir: &Path) {
    // Directory fsync has no well-defined meaning on this platform; the
    // rename is still atomic, it just may not be immediately durable.
}

/// Opens `path` for append, creating it if it does not exist.
pub fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistError::OpenFailure {
            path: path.to_path_buf(),
            cause: e,
        })
}

/// Opens `path` for a fresh write (truncating), used for the compaction backup.
pub fn create_for_write(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| PersistError::io("create", path.to_path_buf(), e))
}

/// Appends `bytes` to an already-open file and fsyncs it. A batch either
/// appends in full or returns the underlying I/O error; partial batches are
/// never surfaced as success. `write_all` already gives us all-or-nothing
/// at the syscall-retry level; fsync gives us all-or-nothing across a crash.
pub fn append_and_sync(file: &mut File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes)
        .map_err(|e| PersistError::io("append", None, e))?;
    fsync(file)
}

/// fsyncs an open file descriptor.
pub fn fsync(file: &File) -> Result<()> {
    file.sync_all().map_err(|e| PersistError::io("fsync", None, e))
}

/// Best-effort space reservation for the backup file ahead of a compaction
/// rewrite. True `fallocate`-style preallocation is not portable, so failure
/// here is silently ignored and never observed by callers.
pub fn preallocate_best_effort(file: &File, size: u64) {
    // Called against a freshly created, empty backup file, so `set_len` only
    // ever grows it. Failure (unsupported fs, quota, ...) is swallowed: this
    // is purely an optimisation, never a correctness requirement.
    let _ = file.set_len(size);
}

/// Pre-allocation size for a compaction backup: `max(32 KiB, current log size)`.
pub fn preallocation_size(current_log_size: u64) -> u64 {
    const MIN: u64 = 32 * 1024;
    current_log_size.max(MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_datafile_integrity_creates_missing_log() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("data.log");
        ensure_datafile_integrity(&log).unwrap();
        assert!(log.exists());
    }

    #[test]
    fn ensure_datafile_integrity_promotes_orphaned_backup() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("data.log");
        let backup = backup_path(&log);
        fs::write(&backup, b"backup contents").unwrap();

        ensure_datafile_integrity(&log).unwrap();

        assert!(log.exists());
        assert!(!backup.exists());
        assert_eq!(fs::read(&log).unwrap(), b"backup contents");
    }

    #[test]
    fn ensure_datafile_integrity_leaves_existing_log_alone() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("data.log");
        let backup = backup_path(&log);
        fs::write(&log, b"pre-compaction").unwrap();
        fs::write(&backup, b"post-compaction").unwrap();

        ensure_datafile_integrity(&log).unwrap();

        assert_eq!(fs::read(&log).unwrap(), b"pre-compaction");
        assert!(backup.exists());
    }

    #[test]
    fn preallocation_size_has_a_32kib_floor() {
        assert_eq!(preallocation_size(0), 32 * 1024);
        assert_eq!(preallocation_size(64 * 1024), 64 * 1024);
    }
}
