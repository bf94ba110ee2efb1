//! Exclusive-writer lock for the ledger files.
//!
//! The lock file is held open with an exclusive advisory `flock` for the
//! lifetime of the ledger. The kernel drops the lock when the holder exits,
//! however it exits, so a file left behind by a crash or power loss never
//! blocks the next start. The pid written into the file is informational.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

/// Lock file contents, for diagnosing who holds the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub created_at: String,
}

/// Held for as long as a `LocalLedger` is open
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
    /// Closing this handle releases the lock
    _file: File,
}

impl LedgerLock {
    /// Acquire the lock at `path`
    ///
    /// A lock file whose holder is gone is simply taken over, whatever pid
    /// it records.
    ///
    /// # Errors
    ///
    /// * `LedgerError::Locked` if another open ledger holds the lock
    /// * `LedgerError::IoFailure` if the lock file cannot be opened or written
    pub fn acquire(path: &Path) -> Result<Self, LedgerError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if !try_lock_exclusive(&file)? {
            let pid = read_info(path).map(|info| info.pid).unwrap_or(0);
            return Err(LedgerError::Locked {
                path: path.display().to_string(),
                pid,
            });
        }

        if let Some(previous) = read_info(path) {
            if previous.pid != std::process::id() {
                debug!("Taking over ledger lock {:?} last held by pid {}", path, previous.pid);
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        write_info(&mut file, &info)?;

        debug!("Acquired ledger lock: {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Take an exclusive non-blocking `flock`; `false` if someone else holds it
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and stays open for the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

// No advisory locking elsewhere; the ledger is only deployed on Linux
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

fn write_info(file: &mut File, info: &LockInfo) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut *file, info)?;
    file.write_all(b"\n")?;
    file.sync_all()
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(contents.trim()).ok()
}
