//! Pidfile persistence
//! One file per backend under the run directory, holding the PID and the
//! kernel start time of the spawned process. The start time is what makes
//! a record trustworthy across supervisor restarts: a recycled PID will
//! not match it.

use crate::domain::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk record of a spawned backend process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidRecord {
    pub pid: u32,
    pub start_time: Option<u64>,
}

/// Handle on one backend's pidfile
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record, if the file exists and parses
    ///
    /// A malformed file is treated as absent; the caller re-spawns and
    /// overwrites it.
    pub fn load(&self) -> Option<PidRecord> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let mut fields = raw.split_whitespace();
        let pid: u32 = fields.next()?.parse().ok()?;
        let start_time: Option<u64> = fields.next().and_then(|s| s.parse().ok());
        Some(PidRecord { pid, start_time })
    }

    pub fn store(&self, record: PidRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = match record.start_time {
            Some(st) => format!("{} {}\n", record.pid, st),
            None => format!("{}\n", record.pid),
        };
        fs::write(&self.path, body)?;
        Ok(())
    }

    /// Remove the file; already-absent is fine
    pub fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Failed to remove pidfile"),
        }
    }
}
