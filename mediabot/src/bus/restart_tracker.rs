//! Restart tracker for supervised actors.
//!
//! # Backoff Algorithm
//!
//! - First 3 failures within the failure window: no backoff
//! - After that: backoff = base * 2^(failures - 3), capped at `max_backoff`
//! - Failures older than the window are forgotten

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

/// Configuration for the restart tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// Window for counting failures.
    pub failure_window_secs: u64,
    /// Number of failures restarted without delay.
    pub failure_threshold: usize,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_backoff_secs: 1,
            max_backoff_secs: 300,
            failure_window_secs: 60,
            failure_threshold: 3,
        }
    }
}

impl RestartPolicy {
    fn window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

#[derive(Debug, Clone, Default)]
struct RestartHistory {
    failures: Vec<Instant>,
    total_restarts: u64,
    /// The slot may not be rebuilt before this instant.
    not_before: Option<Instant>,
}

impl RestartHistory {
    fn record_failure(&mut self, now: Instant, window: Duration) -> usize {
        self.failures.retain(|&t| now.duration_since(t) < window);
        self.failures.push(now);
        self.total_restarts += 1;
        self.failures.len()
    }

    fn recent_failures(&self, now: Instant, window: Duration) -> usize {
        self.failures
            .iter()
            .filter(|&&t| now.duration_since(t) < window)
            .count()
    }
}

/// Tracks actor deaths per component and decides when a rebuild may happen.
#[derive(Debug, Default)]
pub struct RestartTracker {
    history: HashMap<String, RestartHistory>,
    policy: RestartPolicy,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            history: HashMap::new(),
            policy,
        }
    }

    /// Record a death and return the delay before the actor may be rebuilt.
    pub fn record_failure(&mut self, actor_id: &str) -> Duration {
        let now = Instant::now();
        let window = self.policy.window();
        let history = self.history.entry(actor_id.to_string()).or_default();

        let failures = history.record_failure(now, window);
        let backoff = calculate_backoff(&self.policy, failures);
        history.not_before = Some(now + backoff);

        if backoff.is_zero() {
            debug!(actor = actor_id, failures, "Actor died, immediate restart");
        } else {
            info!(actor = actor_id, failures, ?backoff, "Actor died, delaying restart");
        }

        backoff
    }

    /// Whether the backoff for `actor_id` has elapsed.
    pub fn ready(&self, actor_id: &str) -> bool {
        self.history
            .get(actor_id)
            .and_then(|h| h.not_before)
            .is_none_or(|at| Instant::now() >= at)
    }

    pub fn recent_failures(&self, actor_id: &str) -> usize {
        let now = Instant::now();
        self.history
            .get(actor_id)
            .map(|h| h.recent_failures(now, self.policy.window()))
            .unwrap_or(0)
    }

    pub fn total_restarts(&self, actor_id: &str) -> u64 {
        self.history
            .get(actor_id)
            .map(|h| h.total_restarts)
            .unwrap_or(0)
    }
}

/// Formula: base * 2^(failures - threshold) for failures > threshold.
fn calculate_backoff(policy: &RestartPolicy, failures: usize) -> Duration {
    if failures <= policy.failure_threshold {
        return Duration::ZERO;
    }

    let exponent = (failures - policy.failure_threshold - 1).min(MAX_EXPONENT as usize) as u32;
    let multiplier = 2u32.saturating_pow(exponent);
    let backoff = Duration::from_secs(policy.base_backoff_secs).saturating_mul(multiplier);

    backoff.min(Duration::from_secs(policy.max_backoff_secs))
}
