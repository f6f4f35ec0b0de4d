//! Advisory lock on a site directory.
//!
//! Only one process may mutate a site tree. When enabled, the site handle
//! holds an exclusive, non-blocking lock on `<site>/.lock` until dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Name of the lock file created in the site directory.
pub const LOCK_FILE: &str = ".lock";

/// Exclusive lock on a site directory, released on drop.
#[derive(Debug)]
pub struct SiteLock {
    _file: File,
    path: PathBuf,
}

impl SiteLock {
    /// Acquires the lock for `site_dir`, creating the directory if needed.
    ///
    /// # Errors
    /// `ErrorKind::WouldBlock` if another handle already holds the lock.
    pub fn acquire(site_dir: &Path) -> IoResult<Self> {
        fs::create_dir_all(site_dir)?;
        let path = site_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        lock_exclusive(&file)?;
        debug!(path = %path.display(), "acquired site lock");
        Ok(Self { _file: file, path })
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and valid for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let err = IoError::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(IoError::new(
            ErrorKind::WouldBlock,
            "site is locked by another process",
        ))
    } else {
        Err(err)
    }
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    let handle = file.as_raw_handle() as HANDLE;
    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data and
    // all-zero is its documented initial state.
    let ok = unsafe {
        let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if ok == 0 {
        let err = IoError::last_os_error();
        return Err(IoError::new(
            ErrorKind::WouldBlock,
            format!("site is locked by another process: {err}"),
        ));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn lock_exclusive(_file: &File) -> IoResult<()> {
    Err(IoError::new(
        ErrorKind::Unsupported,
        "site locking is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let site = dir.path().join("annalist_site");
        {
            let lock = SiteLock::acquire(&site).unwrap();
            assert!(lock.path().exists());
        }
        SiteLock::acquire(&site).unwrap();
    }

    #[test]
    fn test_second_acquire_would_block() {
        let dir = tempdir().unwrap();
        let _held = SiteLock::acquire(dir.path()).unwrap();
        let err = SiteLock::acquire(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }
}
