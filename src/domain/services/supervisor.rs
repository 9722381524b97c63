//! Supervisor service
//! Reconciles the desired set of egress backends against what is actually
//! running on the host. Apply work fans out with bounded concurrency while
//! all operations for a single egress id stay serialized.

use crate::domain::events;
use crate::domain::ports::{AdapterFactory, Firewall};
use crate::domain::services::health_monitor::HealthMonitor;
use crate::domain::services::managed::ManagedBackend;
use crate::domain::{
    Backend, BackendKind, BackendState, EgressConfig, EgressId, MonitorPolicy, SupervisorError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What the apply pass did for one egress id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New backend configured and started
    Started,

    /// Configuration rewritten; backend was not running so no restart
    Reconfigured,

    /// Configuration rewritten and the running process restarted
    Restarted,

    /// Backend kind changed; old backend torn down, new one started
    Replaced,

    /// Backend no longer in the desired set; stopped and removed
    Removed,

    /// Fingerprint matched the applied configuration; nothing to do
    Unchanged,
}

/// Aggregate result of one apply pass
///
/// A failure on one id never aborts work on the others; every desired id
/// gets exactly one entry.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub results: BTreeMap<EgressId, Result<ApplyOutcome, SupervisorError>>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    pub fn is_ok(&self) -> bool {
        self.failed() == 0
    }
}

/// Point-in-time view of one managed backend
#[derive(Debug, Clone)]
pub struct BackendSnapshot {
    pub id: EgressId,
    pub kind: BackendKind,
    pub state: BackendState,
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    pub consecutive_failures: u32,
    pub restarts_in_window: usize,
}

enum PlannedAction {
    Add(EgressConfig),
    /// Same id and kind, different fingerprint
    Change(EgressConfig),
    /// Same id, different kind
    Replace(EgressConfig),
    /// Fingerprint unchanged but the process is not running
    Start,
    Remove,
}

pub struct Supervisor {
    backends: RwLock<HashMap<EgressId, Arc<ManagedBackend>>>,
    factory: Arc<dyn AdapterFactory>,
    firewall: Arc<dyn Firewall>,
    health: HealthMonitor,
    monitor: MonitorPolicy,
    apply_limit: Arc<Semaphore>,
}

impl Supervisor {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        firewall: Arc<dyn Firewall>,
        health: HealthMonitor,
        monitor: MonitorPolicy,
        apply_concurrency: usize,
    ) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            factory,
            firewall,
            health,
            monitor,
            apply_limit: Arc::new(Semaphore::new(apply_concurrency.max(1))),
        }
    }

    /// Reconcile the desired set against the managed set
    ///
    /// Diffing is driven by config fingerprints: an id present on both
    /// sides with a matching fingerprint is untouched, so a steady-state
    /// apply is free of process churn.
    pub async fn apply_desired_state(
        self: &Arc<Self>,
        desired: Vec<EgressConfig>,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut plan: Vec<(EgressId, PlannedAction)> = Vec::new();

        let mut occurrences: HashMap<&EgressId, usize> = HashMap::new();
        for config in &desired {
            *occurrences.entry(&config.id).or_insert(0) += 1;
        }
        let duplicates: std::collections::HashSet<EgressId> = occurrences
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id.clone())
            .collect();

        {
            let backends = self.backends.read().await;
            let mut seen: std::collections::HashSet<EgressId> = std::collections::HashSet::new();

            for config in desired {
                let id = config.id.clone();
                if duplicates.contains(&id) {
                    report.results.insert(
                        id.clone(),
                        Err(SupervisorError::InvalidConfig {
                            id: id.to_string(),
                            reason: "duplicate egress id in desired state".to_string(),
                        }),
                    );
                    seen.insert(id);
                    continue;
                }
                seen.insert(id.clone());
                // Surface malformed configs here instead of half-applying
                if let Err(e) = config.listen_port() {
                    report.results.insert(id, Err(e));
                    continue;
                }

                match backends.get(&id) {
                    None => plan.push((id, PlannedAction::Add(config))),
                    Some(managed) => {
                        let rec = managed.record.lock().await;
                        if rec.kind() != config.kind {
                            drop(rec);
                            plan.push((id, PlannedAction::Replace(config)));
                        } else if rec.fingerprint_differs(&config.fingerprint()) {
                            drop(rec);
                            plan.push((id, PlannedAction::Change(config)));
                        } else if matches!(
                            rec.state(),
                            BackendState::Stopped | BackendState::NotInstalled
                        ) {
                            drop(rec);
                            plan.push((id, PlannedAction::Start));
                        } else {
                            report.results.insert(id, Ok(ApplyOutcome::Unchanged));
                        }
                    }
                }
            }

            for id in backends.keys() {
                if !seen.contains(id) && !report.results.contains_key(id) {
                    plan.push((id.clone(), PlannedAction::Remove));
                }
            }
        }

        debug!(planned = plan.len(), "Apply plan computed");

        let mut tasks: JoinSet<(EgressId, Result<ApplyOutcome, SupervisorError>)> = JoinSet::new();
        for (id, action) in plan {
            let sup = Arc::clone(self);
            let limit = Arc::clone(&self.apply_limit);
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                let result = match action {
                    PlannedAction::Add(config) => sup.apply_add(config).await,
                    PlannedAction::Change(config) => sup.apply_change(config).await,
                    PlannedAction::Replace(config) => sup.apply_replace(config).await,
                    PlannedAction::Start => sup.apply_start(&id).await,
                    PlannedAction::Remove => sup.apply_remove(&id).await,
                };
                (id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    if let Err(e) = &result {
                        events::failure(&id, e);
                    }
                    report.results.insert(id, result);
                }
                Err(e) => warn!(error = %e, "Apply task panicked"),
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Apply pass finished"
        );
        report
    }

    async fn apply_add(
        self: &Arc<Self>,
        config: EgressConfig,
    ) -> Result<ApplyOutcome, SupervisorError> {
        let port = config.listen_port()?;
        let fingerprint = config.fingerprint();
        let adapter = self.factory.create(&config);

        // Configure before registering, so a bad config is retried as a
        // fresh Add on the next apply pass
        adapter.configure(&config).await?;

        let mut record = Backend::new(config.id.clone(), config.kind);
        record.set_fingerprint(fingerprint);
        let managed = Arc::new(ManagedBackend::new(
            adapter,
            record,
            self.monitor.resolve(config.kind).clone(),
            port,
        ));

        self.backends
            .write()
            .await
            .insert(config.id.clone(), Arc::clone(&managed));

        self.start_backend(&managed).await?;
        Ok(ApplyOutcome::Started)
    }

    async fn apply_change(
        self: &Arc<Self>,
        config: EgressConfig,
    ) -> Result<ApplyOutcome, SupervisorError> {
        let managed = self
            .get(&config.id)
            .await
            .ok_or_else(|| SupervisorError::BackendNotFound(config.id.to_string()))?;
        let _op = managed.op_lock.lock().await;

        let new_port = config.listen_port()?;
        let old_port = managed.listen_port();

        managed.adapter.configure(&config).await?;
        let (state, id) = {
            let mut rec = managed.record.lock().await;
            rec.set_fingerprint(config.fingerprint());
            (rec.state(), rec.id().clone())
        };
        managed.set_listen_port(new_port);

        if !state.has_process() {
            debug!(id = %id, state = %state, "Config updated without restart");
            return Ok(ApplyOutcome::Reconfigured);
        }

        // Config-change restarts bypass the policy engine; they are
        // operator intent, not crash recovery
        {
            let mut rec = managed.record.lock().await;
            let prev = rec.state();
            rec.mark_starting()?;
            events::state_change(&id, prev, BackendState::Starting, "config changed");
        }
        match managed.adapter.restart().await {
            Ok(outcome) => {
                managed
                    .record
                    .lock()
                    .await
                    .mark_running(outcome.pid, outcome.proc_start_time)?;
                events::state_change(&id, BackendState::Starting, BackendState::Running, "restarted");
                if old_port != new_port {
                    if let Err(e) = self.firewall.close_port(&id, old_port).await {
                        events::failure(&id, &e);
                    }
                }
                self.firewall.open_port(&id, new_port).await?;
                Ok(ApplyOutcome::Restarted)
            }
            Err(e) => {
                let mut rec = managed.record.lock().await;
                if let Err(te) = rec.mark_stopped() {
                    events::failure(&id, &te);
                }
                Err(e)
            }
        }
    }

    async fn apply_replace(
        self: &Arc<Self>,
        config: EgressConfig,
    ) -> Result<ApplyOutcome, SupervisorError> {
        self.apply_remove(&config.id).await?;
        self.apply_add(config).await?;
        Ok(ApplyOutcome::Replaced)
    }

    async fn apply_start(self: &Arc<Self>, id: &EgressId) -> Result<ApplyOutcome, SupervisorError> {
        let managed = self
            .get(id)
            .await
            .ok_or_else(|| SupervisorError::BackendNotFound(id.to_string()))?;
        self.start_backend(&managed).await?;
        Ok(ApplyOutcome::Started)
    }

    async fn apply_remove(
        self: &Arc<Self>,
        id: &EgressId,
    ) -> Result<ApplyOutcome, SupervisorError> {
        let managed = match self.backends.write().await.remove(id) {
            Some(m) => m,
            None => return Ok(ApplyOutcome::Removed),
        };
        managed.cancel_monitor();
        let _op = managed.op_lock.lock().await;

        // Stop unconditionally; the adapter no-ops when nothing is
        // recorded, and a Failed backend may still have a live process
        let had_process = managed.record.lock().await.state().has_process();
        managed.adapter.stop().await?;
        if had_process {
            if let Err(e) = self
                .firewall
                .close_port(id, managed.listen_port())
                .await
            {
                events::failure(id, &e);
            }
        }
        let mut rec = managed.record.lock().await;
        let prev = rec.state();
        if prev != BackendState::Stopped {
            rec.mark_stopped()?;
            events::state_change(id, prev, BackendState::Stopped, "removed from desired state");
        }
        Ok(ApplyOutcome::Removed)
    }

    /// Start one backend and put it under health monitoring
    async fn start_backend(
        self: &Arc<Self>,
        managed: &Arc<ManagedBackend>,
    ) -> Result<(), SupervisorError> {
        let _op = managed.op_lock.lock().await;
        let id = managed.record.lock().await.id().clone();

        if !managed.adapter.is_installed().await {
            let mut rec = managed.record.lock().await;
            if rec.state() != BackendState::NotInstalled {
                let prev = rec.state();
                rec.mark_not_installed()?;
                events::state_change(&id, prev, BackendState::NotInstalled, "binary missing");
            }
            return Err(SupervisorError::BinaryMissing {
                binary: managed.adapter.binary_path().display().to_string(),
            });
        }

        {
            let mut rec = managed.record.lock().await;
            if rec.state() == BackendState::NotInstalled {
                rec.mark_installed()?;
            }
            let prev = rec.state();
            rec.mark_starting()?;
            events::state_change(&id, prev, BackendState::Starting, "start requested");
        }

        match managed.adapter.start().await {
            Ok(outcome) => {
                managed
                    .record
                    .lock()
                    .await
                    .mark_running(outcome.pid, outcome.proc_start_time)?;
                events::state_change(&id, BackendState::Starting, BackendState::Running, "started");
                self.firewall.open_port(&id, managed.listen_port()).await?;
                self.health.start_monitoring(Arc::clone(managed));
                Ok(())
            }
            Err(e) => {
                let mut rec = managed.record.lock().await;
                if let Err(te) = rec.mark_stopped() {
                    events::failure(&id, &te);
                }
                Err(e)
            }
        }
    }

    /// Explicitly stop one backend; stopping a stopped backend succeeds
    pub async fn stop(&self, id: &EgressId) -> Result<(), SupervisorError> {
        let managed = self
            .get(id)
            .await
            .ok_or_else(|| SupervisorError::BackendNotFound(id.to_string()))?;
        managed.cancel_monitor();
        let _op = managed.op_lock.lock().await;

        let state = managed.record.lock().await.state();
        if !state.has_process() && state != BackendState::Failed {
            return Ok(());
        }

        managed.adapter.stop().await?;
        {
            let mut rec = managed.record.lock().await;
            let prev = rec.state();
            rec.mark_stopped()?;
            events::state_change(id, prev, BackendState::Stopped, "stop requested");
        }
        if let Err(e) = self.firewall.close_port(id, managed.listen_port()).await {
            events::failure(id, &e);
        }
        Ok(())
    }

    /// Clear a Failed backend's restart budget and start it again
    pub async fn reset_failed(self: &Arc<Self>, id: &EgressId) -> Result<(), SupervisorError> {
        let managed = self
            .get(id)
            .await
            .ok_or_else(|| SupervisorError::BackendNotFound(id.to_string()))?;
        {
            let _op = managed.op_lock.lock().await;
            let mut rec = managed.record.lock().await;
            if rec.state() != BackendState::Failed {
                return Err(SupervisorError::InvalidStateTransition {
                    from: rec.state().to_string(),
                    to: "reset".to_string(),
                });
            }
            rec.mark_stopped()?;
            events::state_change(id, BackendState::Failed, BackendState::Stopped, "operator reset");
            managed.history.lock().await.clear();
        }
        self.start_backend(&managed).await
    }

    /// Stop every managed backend; used for `--stop-all` teardown
    pub async fn stop_all(&self) {
        let ids: Vec<EgressId> = self.backends.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                events::failure(&id, &e);
            }
        }
    }

    /// Shut the supervisor down
    ///
    /// By default monitors are cancelled and backend processes keep
    /// serving; traffic survives a supervisor upgrade. `stop_backends`
    /// tears the processes down too.
    pub async fn shutdown(&self, stop_backends: bool) {
        events::shutdown(if stop_backends {
            "stopping all backends"
        } else {
            "leaving backends running"
        });
        if stop_backends {
            self.stop_all().await;
        } else {
            for managed in self.backends.read().await.values() {
                managed.cancel_monitor();
            }
        }
    }

    /// Snapshot every managed backend for status reporting
    pub async fn status(&self) -> Vec<BackendSnapshot> {
        let backends = self.backends.read().await;
        let mut out = Vec::with_capacity(backends.len());
        for managed in backends.values() {
            let rec = managed.record.lock().await;
            let restarts = managed.history.lock().await.len();
            out.push(BackendSnapshot {
                id: rec.id().clone(),
                kind: rec.kind(),
                state: rec.state(),
                pid: rec.pid(),
                started_at: rec.started_at(),
                consecutive_failures: rec.consecutive_failures(),
                restarts_in_window: restarts,
            });
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn backend_count(&self) -> usize {
        self.backends.read().await.len()
    }

    async fn get(&self, id: &EgressId) -> Option<Arc<ManagedBackend>> {
        self.backends.read().await.get(id).cloned()
    }
}
