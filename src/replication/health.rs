//! Per-peer health state machine
//!
//! `{Healthy, Suspected, Unhealthy}` is a closed set; the elapsed time since
//! the peer's last successful heartbeat is the sole transition input.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A peer's health, a pure function of time elapsed since its last heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Suspected,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Suspected => write!(f, "Suspected"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Evaluate the health transition rule given elapsed time since the peer's
/// last successful heartbeat.
pub fn status_for_elapsed(elapsed: Duration, suspected_timeout: Duration, unhealthy_timeout: Duration) -> HealthStatus {
    if elapsed <= suspected_timeout {
        HealthStatus::Healthy
    } else if elapsed <= unhealthy_timeout {
        HealthStatus::Suspected
    } else {
        HealthStatus::Unhealthy
    }
}

/// Everything the primary tracks about one secondary.
#[derive(Debug, Clone)]
pub struct PeerDescriptor {
    pub address: String,
    pub status: HealthStatus,
    pub last_check: Instant,
    pub last_log_id: u64,
}

impl PeerDescriptor {
    pub fn new(address: String) -> Self {
        Self {
            address,
            // A peer starts Unhealthy until its first heartbeat succeeds: `last_check`
            // is set far enough in the past that the elapsed-time rule immediately
            // classifies it as Unhealthy rather than Healthy-by-default.
            status: HealthStatus::Unhealthy,
            last_check: Instant::now() - Duration::from_secs(3600),
            last_log_id: 0,
        }
    }

    /// Recompute `status` from `elapsed = now - last_check`. Does not touch `last_check`.
    pub fn refresh_status(&mut self, suspected_timeout: Duration, unhealthy_timeout: Duration) -> HealthStatus {
        let elapsed = self.last_check.elapsed();
        self.status = status_for_elapsed(elapsed, suspected_timeout, unhealthy_timeout);
        self.status
    }

    /// Record a successful heartbeat: refresh `last_check`, `last_log_id`, and force Healthy.
    /// Returns whether this is a transition *into* Healthy from a non-Healthy state.
    pub fn record_heartbeat_success(&mut self, last_log_id: u64) -> bool {
        let was_healthy = self.status == HealthStatus::Healthy;
        self.last_check = Instant::now();
        self.last_log_id = last_log_id;
        self.status = HealthStatus::Healthy;
        !was_healthy
    }
}
