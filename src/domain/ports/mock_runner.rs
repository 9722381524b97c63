//! Scriptable in-memory ProcessRunner for tests

use crate::domain::ports::{ProcessRunner, SpawnedProcess};
use crate::domain::SupervisorError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

#[derive(Default)]
struct Inner {
    next_pid: u32,
    alive: HashSet<u32>,
    start_times: HashMap<u32, u64>,
    signals: Vec<(u32, i32, bool)>,
    spawn_count: u32,
    fail_spawns: bool,
    ignore_sigterm: bool,
}

/// Mock runner: spawns are bookkeeping only, signals flip liveness
pub struct MockProcessRunner {
    inner: Mutex<Inner>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_pid: 1000,
                ..Inner::default()
            }),
        }
    }

    /// Make subsequent spawns fail with a SpawnError
    pub fn set_fail_spawns(&self, fail: bool) {
        self.inner.lock().unwrap().fail_spawns = fail;
    }

    /// Simulate a process that traps SIGTERM
    pub fn set_ignore_sigterm(&self, ignore: bool) {
        self.inner.lock().unwrap().ignore_sigterm = ignore;
    }

    /// Simulate a spontaneous crash
    pub fn mark_dead(&self, pid: u32) {
        self.inner.lock().unwrap().alive.remove(&pid);
    }

    pub fn spawn_count(&self) -> u32 {
        self.inner.lock().unwrap().spawn_count
    }

    pub fn signals_sent(&self) -> Vec<(u32, i32, bool)> {
        self.inner.lock().unwrap().signals.clone()
    }

    pub fn alive_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.inner.lock().unwrap().alive.iter().copied().collect();
        pids.sort_unstable();
        pids
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn spawn_detached(
        &self,
        binary: &Path,
        _args: &[String],
    ) -> Result<SpawnedProcess, SupervisorError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_spawns {
            return Err(SupervisorError::Spawn {
                binary: binary.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "mock spawn failure"),
            });
        }
        inner.next_pid += 1;
        inner.spawn_count += 1;
        let pid = inner.next_pid;
        inner.alive.insert(pid);
        inner.start_times.insert(pid, u64::from(pid) * 100);
        Ok(SpawnedProcess {
            pid,
            start_time: Some(u64::from(pid) * 100),
        })
    }

    async fn signal(
        &self,
        pid: u32,
        signal: i32,
        whole_group: bool,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.signals.push((pid, signal, whole_group));
        match signal {
            SIGKILL => {
                inner.alive.remove(&pid);
            }
            SIGTERM if !inner.ignore_sigterm => {
                inner.alive.remove(&pid);
            }
            _ => {}
        }
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.inner.lock().unwrap().alive.contains(&pid)
    }

    async fn proc_start_time(&self, pid: u32) -> Option<u64> {
        self.inner.lock().unwrap().start_times.get(&pid).copied()
    }

    async fn wait_exit(&self, pid: u32, bound: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + bound;
        loop {
            if !self.is_alive(pid).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
