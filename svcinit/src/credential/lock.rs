//! Volume lock preventing two bootstrap runs against the same data volume.
//!
//! An advisory `flock` on `<dir>/.svcinit.lock`. The lock belongs to the
//! open file description, so it goes away when the guard's file is closed,
//! including when the holder crashes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use svcinit_shared::constants::paths;
use svcinit_shared::errors::{InitError, InitResult};

/// Exclusive hold on one data volume. Dropping it releases the volume.
#[derive(Debug)]
pub struct VolumeLock {
    _file: File,
    path: PathBuf,
}

impl VolumeLock {
    /// Take the volume in `dir` without waiting, creating `dir` if needed.
    ///
    /// # Returns
    /// * `Ok(VolumeLock)` - This process now owns the volume
    /// * `Err(InitError::Locked)` - Another bootstrap holds the volume
    /// * `Err(InitError::CredentialPersist)` - The lock file could not be created
    pub fn acquire(dir: &Path) -> InitResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| InitError::persist(dir, e))?;

        let path = dir.join(paths::LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| InitError::persist(&path, e))?;

        match try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(InitError::Locked(format!(
                    "another svcinit instance is bootstrapping {}",
                    dir.display()
                )));
            }
            Err(e) => return Err(InitError::persist(&path, e)),
        }

        tracing::debug!(path = %path.display(), "Holding volume lock");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}
