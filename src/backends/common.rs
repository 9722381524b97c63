//! Shared process-control mechanics for backend adapters
//! Every proxy technology spawns, tracks, and stops its process the same
//! way; only config rendering and argument lists differ. Adapters delegate
//! the common part here.

use crate::domain::ports::{ProcessRunner, StartOutcome};
use crate::domain::{Result, SupervisorError};
use crate::infrastructure::pid_file::{PidFile, PidRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a killed process gets to disappear from the process table
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Process lifecycle handling shared by all backend adapters
pub struct ProcessControl {
    runner: Arc<dyn ProcessRunner>,
    binary: PathBuf,
    config_path: PathBuf,
    pid_file: PidFile,
    stop_timeout: Duration,
}

impl ProcessControl {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        binary: PathBuf,
        config_path: PathBuf,
        pid_path: PathBuf,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            binary,
            config_path,
            pid_file: PidFile::new(pid_path),
            stop_timeout,
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Persist a rendered config artifact, readable by the daemon only
    ///
    /// Artifacts carry credentials, so they never pass through a
    /// world-readable intermediate state: permissions are fixed before
    /// the content lands under the final name.
    pub async fn write_config(&self, contents: &[u8]) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.config_path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.config_path).await?;
        debug!(path = %self.config_path.display(), "Config artifact written");
        Ok(())
    }

    /// The recorded process, if it is still the one we spawned
    ///
    /// A stale record (dead PID, or a live PID whose kernel start time
    /// does not match) is discarded so it can never be confused with a
    /// recycled PID belonging to an unrelated process.
    pub async fn live_process(&self) -> Option<PidRecord> {
        let record = self.pid_file.load()?;
        if !self.runner.is_alive(record.pid).await {
            self.pid_file.remove();
            return None;
        }
        if let Some(expected) = record.start_time {
            if let Some(actual) = self.runner.proc_start_time(record.pid).await {
                if actual != expected {
                    debug!(pid = record.pid, "PID recycled by another process, discarding record");
                    self.pid_file.remove();
                    return None;
                }
            }
        }
        Some(record)
    }

    /// Spawn the backend process; returns the existing process if one is
    /// already running (start is a no-op then).
    pub async fn start(&self, args: &[String]) -> Result<StartOutcome> {
        if let Some(existing) = self.live_process().await {
            debug!(pid = existing.pid, "Process already running, start is a no-op");
            return Ok(StartOutcome {
                pid: existing.pid,
                proc_start_time: existing.start_time,
            });
        }

        let spawned = self.runner.spawn_detached(&self.binary, args).await?;
        self.pid_file.store(PidRecord {
            pid: spawned.pid,
            start_time: spawned.start_time,
        })?;
        Ok(StartOutcome {
            pid: spawned.pid,
            proc_start_time: spawned.start_time,
        })
    }

    /// Stop the backend process; stopping an already-dead process succeeds
    ///
    /// SIGTERM first, then SIGKILL once the grace period runs out. Signals
    /// target the whole process group since the backends detach into their
    /// own session.
    pub async fn stop(&self) -> Result<()> {
        let record = match self.live_process().await {
            Some(r) => r,
            None => return Ok(()),
        };
        let pid = record.pid;

        self.runner.signal(pid, libc::SIGTERM, true).await?;
        if self.runner.wait_exit(pid, self.stop_timeout).await {
            self.pid_file.remove();
            return Ok(());
        }

        warn!(pid = pid, timeout_secs = self.stop_timeout.as_secs(), "SIGTERM grace expired, sending SIGKILL");
        self.runner.signal(pid, libc::SIGKILL, true).await?;
        if !self.runner.wait_exit(pid, KILL_SETTLE).await {
            return Err(SupervisorError::StopTimeout {
                pid,
                timeout: self.stop_timeout,
            });
        }
        self.pid_file.remove();
        Ok(())
    }

    pub async fn is_installed(&self) -> bool {
        tokio::fs::metadata(&self.binary).await.is_ok()
    }

    pub async fn is_running(&self) -> bool {
        self.live_process().await.is_some()
    }

    pub async fn current_pid(&self) -> Option<u32> {
        self.live_process().await.map(|r| r.pid)
    }
}
