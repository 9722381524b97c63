//! End-to-end supervision scenarios over the real adapters, with the OS
//! replaced by the mock process runner.

use async_trait::async_trait;
use egressd::backends::{BinaryPaths, ProxyAdapterFactory};
use egressd::domain::ports::{LivenessProbe, MockProcessRunner, NullFirewall, ProcessRunner};
use egressd::domain::services::{HealthMonitor, Supervisor};
use egressd::domain::{
    BackendKind, BackendState, EgressConfig, EgressId, MonitorConfig, MonitorPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Probe that reports health from the mock process table
struct PidProbe {
    runner: Arc<MockProcessRunner>,
}

#[async_trait]
impl LivenessProbe for PidProbe {
    async fn probe(&self, _id: &EgressId, pid: u32, _port: u16) -> bool {
        self.runner.is_alive(pid).await
    }
}

/// Probe that never succeeds
struct FailingProbe;

#[async_trait]
impl LivenessProbe for FailingProbe {
    async fn probe(&self, _id: &EgressId, _pid: u32, _port: u16) -> bool {
        false
    }
}

struct Harness {
    dir: TempDir,
    runner: Arc<MockProcessRunner>,
    supervisor: Arc<Supervisor>,
}

enum Probe {
    /// Health mirrors the mock process table
    Pid,
    /// Every probe fails
    AlwaysFail,
}

fn harness(monitor: MonitorConfig, probe: Probe) -> Harness {
    harness_with_policy(MonitorPolicy::global(monitor), probe)
}

fn harness_with_policy(policy: MonitorPolicy, probe: Probe) -> Harness {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(MockProcessRunner::new());
    let factory = Arc::new(ProxyAdapterFactory::new(
        Arc::clone(&runner) as Arc<dyn ProcessRunner>,
        dir.path().to_path_buf(),
        BinaryPaths {
            // The mock runner never execs, but is_installed stats these
            shadowsocks: "/bin/true".into(),
            trojan: "/bin/true".into(),
            snell: "/bin/true".into(),
        },
        Duration::from_millis(50),
    ));
    let probe: Arc<dyn LivenessProbe> = match probe {
        Probe::Pid => Arc::new(PidProbe {
            runner: Arc::clone(&runner),
        }),
        Probe::AlwaysFail => Arc::new(FailingProbe),
    };
    let health = HealthMonitor::new(probe, Arc::new(NullFirewall));
    let supervisor = Arc::new(Supervisor::new(
        factory,
        Arc::new(NullFirewall),
        health,
        policy,
        4,
    ));
    Harness {
        dir,
        runner,
        supervisor,
    }
}

fn quiet_monitor() -> MonitorConfig {
    MonitorConfig::default().with_check_interval(3600)
}

fn fast_monitor() -> MonitorConfig {
    MonitorConfig::default()
        .with_check_interval(0)
        .with_restart_cooldown(0)
        .with_unhealthy_threshold(2)
}

fn ss_config(id: &str, port: &str) -> EgressConfig {
    EgressConfig::new(id, BackendKind::Shadowsocks)
        .with_param("port", port)
        .with_param("password", "hunter2")
}

#[tokio::test]
async fn apply_renders_artifacts_and_spawns() {
    let h = harness(quiet_monitor(), Probe::Pid);

    let report = h
        .supervisor
        .apply_desired_state(vec![
            ss_config("tokyo-1", "8388"),
            EgressConfig::new("osaka-1", BackendKind::Snell)
                .with_param("port", "6160")
                .with_param("psk", "sharedsecret"),
        ])
        .await;

    assert!(report.is_ok());
    assert_eq!(h.runner.spawn_count(), 2);
    assert_eq!(h.runner.alive_pids().len(), 2);

    let parsed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(h.dir.path().join("tokyo-1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(parsed["server_port"], 8388);

    let snell_conf = std::fs::read_to_string(h.dir.path().join("osaka-1.conf")).unwrap();
    assert!(snell_conf.contains("listen = 0.0.0.0:6160"));
}

#[tokio::test]
async fn steady_state_apply_causes_no_churn() {
    let h = harness(quiet_monitor(), Probe::Pid);
    let desired = vec![ss_config("tokyo-1", "8388")];

    h.supervisor.apply_desired_state(desired.clone()).await;
    h.supervisor.apply_desired_state(desired.clone()).await;
    h.supervisor.apply_desired_state(desired).await;

    assert_eq!(h.runner.spawn_count(), 1);
    assert!(h.runner.signals_sent().is_empty());
}

#[tokio::test]
async fn config_change_restarts_with_new_artifact() {
    let h = harness(quiet_monitor(), Probe::Pid);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388")])
        .await;
    let first_pid = h.runner.alive_pids()[0];

    let report = h
        .supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8389")])
        .await;

    assert!(report.is_ok());
    assert_eq!(h.runner.spawn_count(), 2);
    let pids = h.runner.alive_pids();
    assert_eq!(pids.len(), 1);
    assert_ne!(pids[0], first_pid);

    let parsed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(h.dir.path().join("tokyo-1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(parsed["server_port"], 8389);
}

#[tokio::test]
async fn removal_stops_the_process() {
    let h = harness(quiet_monitor(), Probe::Pid);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388"), ss_config("nagoya-1", "8389")])
        .await;
    assert_eq!(h.runner.alive_pids().len(), 2);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388")])
        .await;

    assert_eq!(h.runner.alive_pids().len(), 1);
    assert_eq!(h.supervisor.backend_count().await, 1);
}

#[tokio::test]
async fn crashed_process_is_restarted_by_monitor() {
    let h = harness(fast_monitor(), Probe::Pid);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388")])
        .await;
    let first_pid = h.runner.alive_pids()[0];

    h.runner.mark_dead(first_pid);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The monitor noticed the dead process and respawned it
    assert!(h.runner.spawn_count() >= 2);
    let status = h.supervisor.status().await;
    assert_eq!(status[0].state, BackendState::Running);
    assert_ne!(status[0].pid, Some(first_pid));

    h.supervisor.shutdown(true).await;
}

#[tokio::test]
async fn restart_budget_exhaustion_parks_backend_in_failed() {
    let h = harness(fast_monitor().with_max_restarts(2), Probe::AlwaysFail);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388")])
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = h.supervisor.status().await;
    assert_eq!(status[0].state, BackendState::Failed);
    assert_eq!(status[0].pid, None);
    // Initial spawn plus exactly the budgeted restarts
    assert_eq!(h.runner.spawn_count(), 3);

    h.supervisor.shutdown(true).await;
}

#[tokio::test]
async fn per_kind_policy_override_takes_effect() {
    // Snell gets no restart budget at all; shadowsocks keeps its generous
    // global budget, so only the snell backend parks in Failed
    let policy = MonitorPolicy::global(fast_monitor().with_max_restarts(1000))
        .with_override(BackendKind::Snell, fast_monitor().with_max_restarts(0));
    let h = harness_with_policy(policy, Probe::AlwaysFail);

    h.supervisor
        .apply_desired_state(vec![
            ss_config("tokyo-1", "8388"),
            EgressConfig::new("osaka-1", BackendKind::Snell)
                .with_param("port", "6160")
                .with_param("psk", "sharedsecret"),
        ])
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = h.supervisor.status().await;
    let osaka = status.iter().find(|s| s.id == EgressId::from("osaka-1")).unwrap();
    let tokyo = status.iter().find(|s| s.id == EgressId::from("tokyo-1")).unwrap();
    assert_eq!(osaka.state, BackendState::Failed);
    assert_ne!(tokyo.state, BackendState::Failed);

    h.supervisor.shutdown(true).await;
}

#[tokio::test]
async fn invalid_backend_does_not_poison_the_apply() {
    let h = harness(quiet_monitor(), Probe::Pid);

    let report = h
        .supervisor
        .apply_desired_state(vec![
            // Missing the password parameter, configure must fail
            EgressConfig::new("bad-1", BackendKind::Shadowsocks).with_param("port", "8388"),
            ss_config("tokyo-1", "8389"),
        ])
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(report.results[&EgressId::from("bad-1")].is_err());
    assert_eq!(h.supervisor.backend_count().await, 1);
    assert_eq!(h.runner.spawn_count(), 1);
}

#[tokio::test]
async fn stop_all_leaves_pids_dead_and_records_stopped() {
    let h = harness(quiet_monitor(), Probe::Pid);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388"), ss_config("nagoya-1", "8389")])
        .await;

    h.supervisor.stop_all().await;
    h.supervisor.stop_all().await; // second pass is a no-op

    assert!(h.runner.alive_pids().is_empty());
    for snap in h.supervisor.status().await {
        assert_eq!(snap.state, BackendState::Stopped);
    }
    // One SIGTERM per backend, none duplicated by the second stop_all
    let sigterms = h
        .runner
        .signals_sent()
        .iter()
        .filter(|(_, sig, _)| *sig == libc::SIGTERM)
        .count();
    assert_eq!(sigterms, 2);
}

#[tokio::test]
async fn kind_change_tears_down_and_replaces() {
    let h = harness(quiet_monitor(), Probe::Pid);

    h.supervisor
        .apply_desired_state(vec![ss_config("tokyo-1", "8388")])
        .await;

    let report = h
        .supervisor
        .apply_desired_state(vec![EgressConfig::new("tokyo-1", BackendKind::Snell)
            .with_param("port", "8388")
            .with_param("psk", "sharedsecret")])
        .await;

    assert!(report.is_ok());
    assert!(h.dir.path().join("tokyo-1.conf").exists());
    let status = h.supervisor.status().await;
    assert_eq!(status[0].kind, BackendKind::Snell);
    assert_eq!(status[0].state, BackendState::Running);
}
