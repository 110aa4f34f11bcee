use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SecretsError, SecretsResult};

use super::store::ensure_private_dir;

/// Exclusive advisory lock over the secrets directory
///
/// Every mutating operation (upsert, rotate, encrypt, restore) holds one of
/// these for its duration. A second concurrent mutator fails fast with
/// [`SecretsError::StoreBusy`] instead of silently serialising. Read-only
/// operations do not take the lock; they rely on the atomic-rename write
/// convention to never observe a half-written document.
///
/// The lock is released when the guard is dropped, and by the OS if the
/// process dies while holding it.
#[derive(Debug)]
pub struct StoreLock {
    file: std::fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Try to acquire the exclusive lock, failing fast if it is held
    pub fn acquire(lock_path: &Path) -> SecretsResult<Self> {
        if let Some(parent) = lock_path.parent() {
            ensure_private_dir(parent)?;
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(super::store::FILE_MODE);
        }
        let file = options
            .open(lock_path)
            .map_err(|e| SecretsError::at_path(lock_path, e))?;

        lock_exclusive_nonblocking(&file, lock_path)?;
        debug!(path = %lock_path.display(), "store lock acquired");

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        unlock(&self.file);
        debug!(path = %self.path.display(), "store lock released");
    }
}

#[cfg(unix)]
fn lock_exclusive_nonblocking(file: &std::fs::File, lock_path: &Path) -> SecretsResult<()> {
    use std::os::unix::io::AsRawFd;

    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Err(SecretsError::StoreBusy(format!(
                "another operation holds {}",
                lock_path.display()
            )));
        }
        return Err(SecretsError::at_path(lock_path, err));
    }
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &std::fs::File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive_nonblocking(_file: &std::fs::File, _lock_path: &Path) -> SecretsResult<()> {
    tracing::warn!("advisory store locking is not supported on this platform");
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &std::fs::File) {}
