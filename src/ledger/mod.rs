//! # Ledger Module
//!
//! Durable, ordered store of readings that have not been delivered yet.
//!
//! ## On-disk layout
//!
//! ```text
//! ledger.jsonl        {"generation":3}          <- header
//!                     {"id":"101-...", ...}     <- committed (before cursor)
//!                     {"id":"101-...", ...}     <- oldest pending (cursor offset)
//!                     {"id":"101-...", ...}
//! ledger.jsonl.cursor {"generation":3,"offset":1873}
//! ledger.jsonl.lock   {"pid":812,"created_at":"..."}
//! ```
//!
//! Appends go to the end of the data file and are synced before returning.
//! Removing entries only moves the cursor, which is replaced atomically: a
//! crash before the cursor rename leaves the entries pending, so delivery is
//! at-least-once.
//!
//! Once everything is committed, or the committed prefix grows past a
//! threshold, the pending tail is copied into a new data file with the next
//! generation. A cursor exactly one generation behind the data file means the
//! agent stopped between the two renames and points at the new file's start.

pub mod atomic;
pub mod lock;
pub mod retention;

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::reading::Reading;
use lock::LedgerLock;
use retention::Retention;

/// Default committed-prefix size that triggers compaction
pub const DEFAULT_COMPACT_THRESHOLD_BYTES: u64 = 1024 * 1024;

/// First line of the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerHeader {
    generation: u64,
}

/// Position of the oldest pending entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    generation: u64,
    offset: u64,
}

/// Tunables for [`LocalLedger::open`]
#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    pub retention: Retention,
    pub compact_threshold_bytes: u64,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            retention: Retention::unbounded(),
            compact_threshold_bytes: DEFAULT_COMPACT_THRESHOLD_BYTES,
        }
    }
}

/// Append-only file-backed queue of undelivered readings
///
/// All methods take the ledger by reference on the orchestrator's loop; the
/// lock file keeps a second agent process away from the same files.
#[derive(Debug)]
pub struct LocalLedger {
    path: PathBuf,
    cursor_path: PathBuf,
    /// Append handle to the current data file
    file: File,
    generation: u64,
    header_len: u64,
    /// Byte offset of the oldest pending entry
    offset: u64,
    /// Byte length of each pending entry, oldest first, newline included
    entries: VecDeque<u64>,
    options: LedgerOptions,
    _lock: LedgerLock,
}

impl LocalLedger {
    /// Open the ledger at `path`, creating it if missing
    ///
    /// Recovers from a crash during append (torn last line is truncated) or
    /// during compaction (cursor one generation behind).
    ///
    /// # Errors
    ///
    /// * `LedgerError::Locked` if another process holds the ledger
    /// * `LedgerError::CorruptState` if the header, cursor or a complete entry
    ///   cannot be parsed, or the cursor points outside the file
    /// * `LedgerError::IoFailure` for any file operation failure
    pub fn open(path: impl AsRef<Path>, options: LedgerOptions) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = LedgerLock::acquire(&sidecar(&path, "lock"))?;
        let cursor_path = sidecar(&path, "cursor");

        if !path.exists() {
            let header = encode_header(0)?;
            atomic::write_bytes(&path, &header)?;
            info!("Created ledger at {:?}", path);
        }

        let file_len = fs::metadata(&path)?.len();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        if !line.ends_with(b"\n") {
            return Err(LedgerError::CorruptState(format!("{:?} has no header line", path)));
        }
        let header: LedgerHeader = serde_json::from_slice(&line[..line.len() - 1])
            .map_err(|e| LedgerError::CorruptState(format!("invalid ledger header: {}", e)))?;
        let header_len = line.len() as u64;

        let offset = match load_cursor(&cursor_path)? {
            None => header_len,
            Some(cursor) if cursor.generation == header.generation => cursor.offset,
            Some(cursor) if cursor.generation + 1 == header.generation => {
                info!("Resuming after interrupted compaction (generation {})", header.generation);
                header_len
            }
            Some(cursor) => {
                return Err(LedgerError::CorruptState(format!(
                    "cursor generation {} does not match ledger generation {}",
                    cursor.generation, header.generation
                )));
            }
        };

        if offset < header_len || offset > file_len {
            return Err(LedgerError::CorruptState(format!(
                "cursor offset {} outside ledger data ({}..{})",
                offset, header_len, file_len
            )));
        }

        reader.seek(SeekFrom::Start(offset))?;
        let mut entries = VecDeque::new();
        let mut end = offset;
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if !line.ends_with(b"\n") {
                warn!("Discarding torn ledger entry at byte {} ({} bytes)", end, n);
                break;
            }
            serde_json::from_slice::<Reading>(&line[..n - 1]).map_err(|e| {
                LedgerError::CorruptState(format!("unreadable entry at byte {}: {}", end, e))
            })?;
            entries.push_back(n as u64);
            end += n as u64;
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        if end < file_len {
            file.set_len(end)?;
            file.sync_all()?;
        }

        store_cursor(&cursor_path, Cursor { generation: header.generation, offset })?;

        info!(
            "Opened ledger {:?}: {} pending readings (generation {})",
            path,
            entries.len(),
            header.generation
        );

        Ok(Self {
            path,
            cursor_path,
            file,
            generation: header.generation,
            header_len,
            offset,
            entries,
            options,
            _lock: lock,
        })
    }

    /// Durably append a reading behind all pending entries
    ///
    /// Returns the number of oldest entries discarded by the retention policy
    /// to make room (0 when unbounded).
    pub fn append(&mut self, reading: &Reading) -> Result<usize, LedgerError> {
        let mut line = serde_json::to_vec(reading).map_err(|e| {
            LedgerError::CorruptState(format!("cannot serialize reading {}: {}", reading.id(), e))
        })?;
        line.push(b'\n');

        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.entries.push_back(line.len() as u64);
        debug!("Buffered reading {} ({} pending)", reading.id(), self.entries.len());

        let excess = self.options.retention.excess(self.entries.len());
        if excess > 0 {
            let dropped = self.peek_oldest(excess)?;
            self.advance(excess)?;
            for reading in &dropped {
                warn!(
                    reading_id = %reading.id(),
                    timestamp = %reading.timestamp(),
                    "Retention limit reached, dropped oldest undelivered reading"
                );
            }
        }

        Ok(excess)
    }

    /// Up to `n` oldest pending readings, in append order, without removing them
    pub fn peek_oldest(&self, n: usize) -> Result<Vec<Reading>, LedgerError> {
        let count = n.min(self.entries.len());
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes: u64 = self.entries.iter().take(count).sum();
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = vec![0u8; bytes as usize];
        file.read_exact(&mut buf)?;

        buf[..buf.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| {
                serde_json::from_slice(line)
                    .map_err(|e| LedgerError::CorruptState(format!("unreadable pending entry: {}", e)))
            })
            .collect()
    }

    /// Remove the `n` oldest entries after the endpoint acknowledged them
    pub fn commit(&mut self, n: usize) -> Result<(), LedgerError> {
        self.advance(n)?;
        debug!("Committed {} readings ({} pending)", n, self.entries.len());
        Ok(())
    }

    /// Remove the `n` oldest entries without delivery
    ///
    /// Used when the endpoint refuses them outright; the caller logs each one.
    pub fn discard(&mut self, n: usize) -> Result<(), LedgerError> {
        self.advance(n)?;
        debug!("Discarded {} readings ({} pending)", n, self.entries.len());
        Ok(())
    }

    /// Number of pending entries
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held by pending entries
    pub fn pending_bytes(&self) -> u64 {
        self.entries.iter().sum()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn advance(&mut self, n: usize) -> Result<(), LedgerError> {
        if n > self.entries.len() {
            return Err(LedgerError::CorruptState(format!(
                "cannot remove {} entries, only {} pending",
                n,
                self.entries.len()
            )));
        }
        if n == 0 {
            return Ok(());
        }

        let bytes: u64 = self.entries.iter().take(n).sum();
        let offset = self.offset + bytes;
        store_cursor(&self.cursor_path, Cursor { generation: self.generation, offset })?;

        self.entries.drain(..n);
        self.offset = offset;
        self.maybe_compact()
    }

    fn maybe_compact(&mut self) -> Result<(), LedgerError> {
        let committed = self.offset - self.header_len;
        if committed == 0 {
            return Ok(());
        }
        if !self.entries.is_empty() && committed < self.options.compact_threshold_bytes {
            return Ok(());
        }
        self.compact()
    }

    /// Rewrite the pending tail into a fresh data file of the next generation
    fn compact(&mut self) -> Result<(), LedgerError> {
        let generation = self.generation + 1;
        let header = encode_header(generation)?;
        let tail_len = self.pending_bytes();

        let mut source = File::open(&self.path)?;
        source.seek(SeekFrom::Start(self.offset))?;
        atomic::replace_with(&self.path, |file| {
            file.write_all(&header)?;
            let copied = io::copy(&mut (&mut source).take(tail_len), file)?;
            if copied != tail_len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("copied {} of {} pending bytes", copied, tail_len),
                ));
            }
            Ok(())
        })?;

        // The old handle still points at the replaced file
        self.file = OpenOptions::new().append(true).open(&self.path)?;

        let header_len = header.len() as u64;
        store_cursor(&self.cursor_path, Cursor { generation, offset: header_len })?;

        debug!(
            "Compacted ledger to generation {} ({} pending readings)",
            generation,
            self.entries.len()
        );
        self.generation = generation;
        self.header_len = header_len;
        self.offset = header_len;
        Ok(())
    }
}

fn sidecar(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn encode_header(generation: u64) -> Result<Vec<u8>, LedgerError> {
    let mut header = serde_json::to_vec(&LedgerHeader { generation })
        .map_err(|e| LedgerError::CorruptState(format!("cannot encode header: {}", e)))?;
    header.push(b'\n');
    Ok(header)
}

fn load_cursor(path: &Path) -> Result<Option<Cursor>, LedgerError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LedgerError::CorruptState(format!("invalid cursor file: {}", e))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn store_cursor(path: &Path, cursor: Cursor) -> Result<(), LedgerError> {
    let bytes = serde_json::to_vec(&cursor)
        .map_err(|e| LedgerError::CorruptState(format!("cannot encode cursor: {}", e)))?;
    atomic::write_bytes(path, &bytes)?;
    Ok(())
}
