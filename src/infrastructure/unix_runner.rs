//! Unix process runner
//! Real implementation of the ProcessRunner port. Backends are spawned
//! detached in their own session so they survive a supervisor restart,
//! and a reaper task collects each child's exit status to avoid zombies.

use crate::domain::ports::{ProcessRunner, SpawnedProcess};
use crate::domain::{Result, SupervisorError};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Poll granularity for bounded exit waits
const WAIT_POLL: Duration = Duration::from_millis(50);

pub struct UnixProcessRunner;

impl UnixProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Kernel start time of a PID from /proc/<pid>/stat (field 22)
    fn read_proc_start_time(pid: u32) -> Option<u64> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        Self::parse_stat_start_time(&stat)
    }

    /// The comm field can contain spaces and parentheses, so fields are
    /// counted from after the closing paren. A garbled stat line yields
    /// None, same as an unreadable one.
    fn parse_stat_start_time(stat: &str) -> Option<u64> {
        let after_comm = stat.get(stat.rfind(')')? + 2..)?;
        after_comm.split_whitespace().nth(19)?.parse().ok()
    }

    fn pid_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
}

impl Default for UnixProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for UnixProcessRunner {
    async fn spawn_detached(&self, binary: &Path, args: &[String]) -> Result<SpawnedProcess> {
        debug!(binary = %binary.display(), args = ?args, "Spawning backend process");

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                // New session, so signals to the supervisor's group never
                // reach the backend and group kills target only its tree
                if libc::setsid() < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(binary = %binary.display(), error = %e, "Failed to spawn backend");
            SupervisorError::Spawn {
                binary: binary.display().to_string(),
                source: e,
            }
        })?;

        let pid = child.id();
        let start_time = Self::read_proc_start_time(pid);

        // Reap the child when it exits; the process record elsewhere is
        // what tracks liveness, this only prevents zombies
        tokio::task::spawn_blocking(move || match child.wait() {
            Ok(status) => debug!(pid = pid, status = %status, "Backend process reaped"),
            Err(e) => warn!(pid = pid, error = %e, "Failed to reap backend process"),
        });

        Ok(SpawnedProcess { pid, start_time })
    }

    async fn signal(&self, pid: u32, signal: i32, whole_group: bool) -> Result<()> {
        let target = if whole_group {
            -(pid as i32)
        } else {
            pid as i32
        };
        let rc = unsafe { libc::kill(target, signal) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // Already gone is what stop wanted anyway
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            warn!(pid = pid, signal = signal, error = %err, "Failed to signal process");
            return Err(SupervisorError::Io(err));
        }
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        Self::pid_alive(pid)
    }

    async fn proc_start_time(&self, pid: u32) -> Option<u64> {
        Self::read_proc_start_time(pid)
    }

    async fn wait_exit(&self, pid: u32, bound: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + bound;
        loop {
            if !Self::pid_alive(pid) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}
