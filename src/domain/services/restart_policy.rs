//! Restart policy engine
//! Cooldown plus sliding-window rate limiter gating automatic restarts.
//! The window is a rolling 60 minutes pruned lazily at decision time,
//! never a fixed hourly bucket.

use crate::domain::{MonitorConfig, RestartHistory};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of one restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart may proceed; the slot has been recorded in the history
    Approved,

    /// Cooldown since the last restart has not elapsed
    DeniedCoolingDown { remaining: Duration },

    /// In-window restart count reached `max_restarts`
    DeniedBudgetExhausted { slot_frees_in: Duration },
}

/// Stateless decision engine; the history it mutates lives with the backend
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartPolicyEngine;

impl RestartPolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Gate one restart request at `now`
    ///
    /// An approval consumes a budget slot immediately. A subsequently
    /// failing spawn does not refund it; the next attempt is gated by
    /// cooldown on the next health-check cycle.
    pub fn decide(
        &self,
        history: &mut RestartHistory,
        config: &MonitorConfig,
        now: Instant,
    ) -> RestartDecision {
        history.prune(now);

        if let Some(last) = history.last_restart() {
            let elapsed = now.duration_since(last);
            let cooldown = config.restart_cooldown();
            if elapsed < cooldown {
                return RestartDecision::DeniedCoolingDown {
                    remaining: cooldown - elapsed,
                };
            }
        }

        if history.len() >= config.max_restarts as usize {
            let slot_frees_in = history
                .time_until_slot_free(now)
                .unwrap_or(Duration::ZERO);
            debug!(
                in_window = history.len(),
                max_restarts = config.max_restarts,
                slot_frees_in_secs = slot_frees_in.as_secs(),
                "Restart budget exhausted"
            );
            return RestartDecision::DeniedBudgetExhausted { slot_frees_in };
        }

        history.record(now);
        RestartDecision::Approved
    }
}
