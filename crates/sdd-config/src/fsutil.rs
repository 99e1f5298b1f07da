//! Atomic-write and write-serialization helpers shared by the project
//! config store and the change store.

use sdd_core::CoreError;
use std::path::Path;

/// Writes `data` to `target` via temp-file-in-same-dir + rename, so a
/// reader never observes a partially written file.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<(), CoreError> {
    let parent = target
        .parent()
        .ok_or_else(|| CoreError::Io(format!("{} has no parent directory", target.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| CoreError::Io(format!("creating temp file in {}: {e}", parent.display())))?;
    std::io::Write::write_all(&mut tmp, data)
        .map_err(|e| CoreError::Io(format!("writing temp file: {e}")))?;
    tmp.persist(target)
        .map_err(|e| CoreError::Io(format!("persisting {}: {e}", target.display())))?;
    Ok(())
}

/// Runs `f` while holding an exclusive advisory lock on `{dir}/.lock`,
/// creating `dir` first if needed. Serializes concurrent mutating calls
/// against the same directory within this process (and across processes
/// sharing the filesystem).
pub fn with_write_lock<T>(dir: &Path, f: impl FnOnce() -> Result<T, CoreError>) -> Result<T, CoreError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CoreError::Io(format!("creating {}: {e}", dir.display())))?;
    let lock_path = dir.join(".lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| CoreError::Io(format!("opening {}: {e}", lock_path.display())))?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| CoreError::Io(format!("acquiring write lock: {e}")))?;
    f()
}
