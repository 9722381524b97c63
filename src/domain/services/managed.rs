//! Per-backend supervision handle
//! Bundles everything the supervisor holds for one egress id. All mutating
//! operations on a backend serialize on `op_lock`, so concurrent apply,
//! health-check, and restart work never races on process state.

use crate::domain::ports::BackendAdapter;
use crate::domain::{Backend, MonitorConfig, RestartHistory};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct ManagedBackend {
    pub(crate) adapter: Arc<dyn BackendAdapter>,
    pub(crate) record: Mutex<Backend>,
    pub(crate) monitor: MonitorConfig,
    pub(crate) history: Mutex<RestartHistory>,
    /// Serializes Configure/Start/Stop/Restart for this id
    pub(crate) op_lock: Mutex<()>,
    listen_port: AtomicU16,
    monitor_cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl ManagedBackend {
    pub fn new(
        adapter: Arc<dyn BackendAdapter>,
        record: Backend,
        monitor: MonitorConfig,
        listen_port: u16,
    ) -> Self {
        Self {
            adapter,
            record: Mutex::new(record),
            monitor,
            history: Mutex::new(RestartHistory::new()),
            op_lock: Mutex::new(()),
            listen_port: AtomicU16::new(listen_port),
            monitor_cancel: std::sync::Mutex::new(None),
        }
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port.load(Ordering::Relaxed)
    }

    pub fn set_listen_port(&self, port: u16) {
        self.listen_port.store(port, Ordering::Relaxed);
    }

    /// Install a fresh monitor cancellation token, cancelling any previous
    /// one so at most one monitor task runs per backend.
    pub fn replace_monitor_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut guard = self
            .monitor_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(old) = guard.take() {
            old.cancel();
        }
        *guard = Some(token.clone());
        token
    }

    /// Cancel the monitor task, if one is running
    pub fn cancel_monitor(&self) {
        let mut guard = self
            .monitor_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = guard.take() {
            token.cancel();
        }
    }
}
