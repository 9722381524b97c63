//! Health monitor service
//! One independent periodic task per backend, started when the backend
//! enters Running. Probe failures feed the restart policy engine; probes
//! never outlive their configured timeout.

use crate::domain::events;
use crate::domain::ports::{Firewall, LivenessProbe};
use crate::domain::services::managed::ManagedBackend;
use crate::domain::services::{RestartDecision, RestartPolicyEngine};
use crate::domain::{BackendState, EgressId, SupervisorError};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Health monitor service
/// Detects unhealthy backends and requests restarts through the policy
/// engine; the engine decides, the adapter executes.
pub struct HealthMonitor {
    probe: Arc<dyn LivenessProbe>,
    firewall: Arc<dyn Firewall>,
    policy: RestartPolicyEngine,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn LivenessProbe>, firewall: Arc<dyn Firewall>) -> Self {
        Self {
            probe,
            firewall,
            policy: RestartPolicyEngine::new(),
        }
    }

    /// Start monitoring one backend in a background task
    ///
    /// Timers are independent per backend, never a shared global tick, so
    /// failures across many backends do not burst-synchronize. Any
    /// previously running monitor for the same backend is cancelled.
    pub fn start_monitoring(&self, managed: Arc<ManagedBackend>) {
        if !managed.monitor.enabled {
            return;
        }
        let token = managed.replace_monitor_token();
        let probe = Arc::clone(&self.probe);
        let firewall = Arc::clone(&self.firewall);
        let policy = self.policy;

        tokio::spawn(async move {
            Self::monitor_loop(managed, probe, firewall, policy, token).await;
        });
    }

    async fn monitor_loop(
        managed: Arc<ManagedBackend>,
        probe: Arc<dyn LivenessProbe>,
        firewall: Arc<dyn Firewall>,
        policy: RestartPolicyEngine,
        token: CancellationToken,
    ) {
        let id = managed.record.lock().await.id().clone();
        let interval = managed.monitor.check_interval();
        let probe_bound = managed.monitor.health_timeout();
        let threshold = managed.monitor.unhealthy_threshold;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(id = %id, "Health monitor cancelled");
                    break;
                }
                _ = sleep(interval) => {}
            }

            let (state, pid) = {
                let rec = managed.record.lock().await;
                (rec.state(), rec.pid())
            };

            match state {
                BackendState::Stopped | BackendState::NotInstalled => {
                    debug!(id = %id, state = %state, "Backend left supervision, stopping monitor");
                    break;
                }
                // No process to probe; keep asking until the window ages
                // a slot out, then the approved restart revives it.
                BackendState::Failed => {
                    Self::request_restart(&managed, &id, &firewall, policy).await;
                    continue;
                }
                _ => {}
            }

            let healthy = match pid {
                Some(pid) => {
                    match timeout(probe_bound, probe.probe(&id, pid, managed.listen_port())).await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(
                                id = %id,
                                error = %SupervisorError::HealthCheckTimeout { timeout: probe_bound },
                                "Liveness probe timed out"
                            );
                            false
                        }
                    }
                }
                None => false,
            };

            let failures = managed.record.lock().await.record_check(healthy, Instant::now());

            if healthy {
                if matches!(state, BackendState::Unhealthy | BackendState::CoolingDown) {
                    let recovered = {
                        let mut rec = managed.record.lock().await;
                        let prev = rec.state();
                        if matches!(prev, BackendState::Unhealthy | BackendState::CoolingDown) {
                            match rec.mark_recovered() {
                                Ok(()) => {
                                    events::state_change(
                                        &id,
                                        prev,
                                        BackendState::Running,
                                        "probe succeeded",
                                    );
                                    true
                                }
                                Err(e) => {
                                    events::failure(&id, &e);
                                    false
                                }
                            }
                        } else {
                            false
                        }
                    };
                    if recovered {
                        if let Err(e) = firewall.open_port(&id, managed.listen_port()).await {
                            events::failure(&id, &e);
                        }
                    }
                }
                continue;
            }

            debug!(id = %id, failures = failures, threshold = threshold, "Liveness probe failed");

            match state {
                BackendState::Running if failures >= threshold => {
                    {
                        let mut rec = managed.record.lock().await;
                        let prev = rec.state();
                        if let Err(e) = rec.mark_unhealthy() {
                            events::failure(&id, &e);
                            continue;
                        }
                        events::state_change(
                            &id,
                            prev,
                            BackendState::Unhealthy,
                            "consecutive probe failures",
                        );
                    }
                    if let Err(e) = firewall.close_port(&id, managed.listen_port()).await {
                        events::failure(&id, &e);
                    }
                    Self::request_restart(&managed, &id, &firewall, policy).await;
                }
                BackendState::Unhealthy | BackendState::CoolingDown => {
                    Self::request_restart(&managed, &id, &firewall, policy).await;
                }
                _ => {}
            }
        }
    }

    /// Ask the policy engine for a restart and carry out its decision
    async fn request_restart(
        managed: &Arc<ManagedBackend>,
        id: &EgressId,
        firewall: &Arc<dyn Firewall>,
        policy: RestartPolicyEngine,
    ) {
        let _op = managed.op_lock.lock().await;

        // State may have moved while waiting for the lock
        let state = managed.record.lock().await.state();
        if !matches!(
            state,
            BackendState::Unhealthy | BackendState::CoolingDown | BackendState::Failed
        ) {
            return;
        }

        let decision = {
            let mut history = managed.history.lock().await;
            policy.decide(&mut history, &managed.monitor, Instant::now())
        };

        match decision {
            RestartDecision::Approved => {
                let in_window = managed.history.lock().await.len();
                events::restart_attempt(id, in_window);

                {
                    let mut rec = managed.record.lock().await;
                    let prev = rec.state();
                    if let Err(e) = rec.mark_starting() {
                        events::failure(id, &e);
                        return;
                    }
                    events::state_change(id, prev, BackendState::Starting, "restart approved");
                }

                match managed.adapter.restart().await {
                    Ok(outcome) => {
                        {
                            let mut rec = managed.record.lock().await;
                            if let Err(e) = rec.mark_running(outcome.pid, outcome.proc_start_time)
                            {
                                events::failure(id, &e);
                                return;
                            }
                        }
                        events::state_change(
                            id,
                            BackendState::Starting,
                            BackendState::Running,
                            "restarted",
                        );
                        if let Err(e) = firewall.open_port(id, managed.listen_port()).await {
                            events::failure(id, &e);
                        }
                    }
                    Err(e) => {
                        // The budget slot stays spent; the next attempt is
                        // gated by cooldown on the next check cycle.
                        events::failure(id, &e);
                        let mut rec = managed.record.lock().await;
                        if let Err(e) = rec.mark_cooling_down() {
                            events::failure(id, &e);
                        } else {
                            events::state_change(
                                id,
                                BackendState::Starting,
                                BackendState::CoolingDown,
                                "restart spawn failed",
                            );
                        }
                    }
                }
            }
            RestartDecision::DeniedCoolingDown { remaining } => {
                events::restart_denied(id, "cooldown", Some(remaining));
                if state == BackendState::Unhealthy {
                    let mut rec = managed.record.lock().await;
                    if let Err(e) = rec.mark_cooling_down() {
                        events::failure(id, &e);
                    } else {
                        events::state_change(
                            id,
                            BackendState::Unhealthy,
                            BackendState::CoolingDown,
                            "cooldown active",
                        );
                    }
                }
            }
            RestartDecision::DeniedBudgetExhausted { slot_frees_in } => {
                events::restart_denied(id, "budget-exhausted", Some(slot_frees_in));
                if state != BackendState::Failed {
                    let mut rec = managed.record.lock().await;
                    if let Err(e) = rec.mark_failed() {
                        events::failure(id, &e);
                    } else {
                        events::state_change(
                            id,
                            state,
                            BackendState::Failed,
                            "restart budget exhausted",
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        BackendAdapter, BackendStatus, NullFirewall, StartOutcome,
    };
    use crate::domain::{Backend, BackendKind, EgressConfig, MonitorConfig};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedProbe {
        healthy: AtomicBool,
        hang: AtomicBool,
    }

    impl ScriptedProbe {
        fn new(healthy: bool) -> Self {
            Self {
                healthy: AtomicBool::new(healthy),
                hang: AtomicBool::new(false),
            }
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        fn set_hang(&self, hang: bool) {
            self.hang.store(hang, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self, _id: &EgressId, _pid: u32, _port: u16) -> bool {
            if self.hang.load(Ordering::SeqCst) {
                sleep(Duration::from_secs(3600)).await;
            }
            self.healthy.load(Ordering::SeqCst)
        }
    }

    struct CountingAdapter {
        binary: PathBuf,
        restarts: AtomicU32,
        fail_restarts: AtomicBool,
    }

    impl CountingAdapter {
        fn new() -> Self {
            Self {
                binary: PathBuf::from("/usr/bin/mock-backend"),
                restarts: AtomicU32::new(0),
                fail_restarts: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for CountingAdapter {
        async fn configure(&self, _config: &EgressConfig) -> Result<(), SupervisorError> {
            Ok(())
        }

        async fn start(&self) -> Result<StartOutcome, SupervisorError> {
            Ok(StartOutcome { pid: 100, proc_start_time: None })
        }

        async fn stop(&self) -> Result<(), SupervisorError> {
            Ok(())
        }

        async fn restart(&self) -> Result<StartOutcome, SupervisorError> {
            if self.fail_restarts.load(Ordering::SeqCst) {
                return Err(SupervisorError::Spawn {
                    binary: self.binary.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "scripted"),
                });
            }
            let n = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(StartOutcome { pid: 100 + n, proc_start_time: None })
        }

        async fn status(&self) -> BackendStatus {
            BackendStatus { installed: true, running: true, pid: Some(100) }
        }

        async fn is_installed(&self) -> bool {
            true
        }

        async fn is_running(&self) -> bool {
            true
        }

        fn binary_path(&self) -> &Path {
            &self.binary
        }
    }

    fn running_backend(monitor: MonitorConfig) -> Arc<ManagedBackend> {
        let mut record = Backend::new(EgressId::from("egress-1"), BackendKind::Shadowsocks);
        record.mark_starting().unwrap();
        record.mark_running(100, None).unwrap();
        Arc::new(ManagedBackend::new(
            Arc::new(CountingAdapter::new()),
            record,
            monitor,
            8388,
        ))
    }

    fn fast_monitor() -> MonitorConfig {
        MonitorConfig::default()
            .with_check_interval(0) // tick as fast as the runtime allows
            .with_restart_cooldown(0)
            .with_max_restarts(100)
            .with_health_timeout(1)
            .with_unhealthy_threshold(2)
    }

    #[tokio::test]
    async fn test_healthy_backend_stays_running() {
        let managed = running_backend(fast_monitor());
        let probe = Arc::new(ScriptedProbe::new(true));
        let monitor = HealthMonitor::new(probe, Arc::new(NullFirewall));

        monitor.start_monitoring(Arc::clone(&managed));
        sleep(Duration::from_millis(100)).await;
        managed.cancel_monitor();

        let rec = managed.record.lock().await;
        assert_eq!(rec.state(), BackendState::Running);
        assert_eq!(rec.last_check_healthy(), Some(true));
    }

    #[tokio::test]
    async fn test_consecutive_failures_trigger_restart() {
        let managed = running_backend(fast_monitor());
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = HealthMonitor::new(probe.clone(), Arc::new(NullFirewall));

        monitor.start_monitoring(Arc::clone(&managed));
        sleep(Duration::from_millis(100)).await;

        // Restart happened and the history recorded it
        assert!(!managed.history.lock().await.is_empty());

        // Let the probe recover so the loop settles back to Running
        probe.set_healthy(true);
        sleep(Duration::from_millis(100)).await;
        managed.cancel_monitor();

        assert_eq!(managed.record.lock().await.state(), BackendState::Running);
    }

    #[tokio::test]
    async fn test_single_failure_does_not_restart() {
        let managed = running_backend(fast_monitor().with_check_interval(3600));
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = HealthMonitor::new(probe, Arc::new(NullFirewall));

        // One manual tick's worth of bookkeeping: a single failure stays
        // below the threshold of 2
        let failures = managed
            .record
            .lock()
            .await
            .record_check(false, Instant::now());
        assert_eq!(failures, 1);
        assert!(managed.history.lock().await.is_empty());
        assert_eq!(managed.record.lock().await.state(), BackendState::Running);
        drop(monitor);
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_failure() {
        let mut cfg = fast_monitor();
        cfg.health_timeout = 0; // every probe overruns immediately
        let managed = running_backend(cfg);
        let probe = Arc::new(ScriptedProbe::new(true));
        probe.set_hang(true);
        let monitor = HealthMonitor::new(probe, Arc::new(NullFirewall));

        monitor.start_monitoring(Arc::clone(&managed));
        sleep(Duration::from_millis(100)).await;
        managed.cancel_monitor();

        // Timeouts were recorded as failures and drove a restart
        let rec = managed.record.lock().await;
        assert_eq!(rec.last_check_healthy(), Some(false));
        assert!(!managed.history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_moves_to_failed() {
        let adapter = Arc::new(CountingAdapter::new());
        adapter.fail_restarts.store(true, Ordering::SeqCst);
        let mut record = Backend::new(EgressId::from("egress-1"), BackendKind::Shadowsocks);
        record.mark_starting().unwrap();
        record.mark_running(100, None).unwrap();
        let managed = Arc::new(ManagedBackend::new(
            adapter,
            record,
            fast_monitor().with_max_restarts(2),
            8388,
        ));
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = HealthMonitor::new(probe, Arc::new(NullFirewall));

        monitor.start_monitoring(Arc::clone(&managed));
        sleep(Duration::from_millis(300)).await;
        managed.cancel_monitor();

        assert_eq!(managed.record.lock().await.state(), BackendState::Failed);
    }

    #[tokio::test]
    async fn test_recovery_without_restart() {
        let managed = running_backend(fast_monitor().with_check_interval(3600));
        {
            let mut rec = managed.record.lock().await;
            rec.record_check(false, Instant::now());
            rec.record_check(false, Instant::now());
            rec.mark_unhealthy().unwrap();
        }

        // A single success returns the backend to Running with no restart
        {
            let mut rec = managed.record.lock().await;
            rec.record_check(true, Instant::now());
            rec.mark_recovered().unwrap();
        }
        assert_eq!(managed.record.lock().await.state(), BackendState::Running);
        assert!(managed.history.lock().await.is_empty());
    }
}
