//! Secondary Applier
//!
//! Accepts replicated entries, deduplicates, buffers out-of-order arrivals,
//! and exposes a contiguous `applied_log` starting at id 1.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::replication::message::LogEntry;

struct SecondaryState {
    applied_log: Vec<LogEntry>,
    seen_ids: HashSet<u64>,
    buffer: HashMap<u64, String>,
    next_expected_id: u64,
}

impl SecondaryState {
    fn new() -> Self {
        Self {
            applied_log: Vec::new(),
            seen_ids: HashSet::new(),
            buffer: HashMap::new(),
            next_expected_id: 1,
        }
    }

    /// Move contiguous buffered entries into `applied_log`. Caller holds the mutex.
    fn drain_buffer(&mut self) {
        let mut drained = 0u64;
        while let Some(payload) = self.buffer.remove(&self.next_expected_id) {
            self.applied_log.push(LogEntry {
                id: self.next_expected_id,
                payload,
            });
            self.next_expected_id += 1;
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, next_expected_id = self.next_expected_id, "drained buffer");
        }
    }

    fn last_log_id(&self) -> u64 {
        self.applied_log.last().map(|e| e.id).unwrap_or(0)
    }
}

/// Result of replicating a single entry into a secondary's applied log.
pub struct ApplyOutcome {
    pub success: bool,
    pub message: &'static str,
}

/// A snapshot of the secondary's counters, for the richer secondary `/health` view.
pub struct SecondaryHealth {
    pub last_log_id: u64,
    pub total_logs: usize,
    pub buffered_messages: usize,
    pub next_expected_id: u64,
}

/// One secondary node's ordering/deduplication engine.
pub struct SecondaryApplier {
    name: String,
    artificial_delay: Duration,
    state: Mutex<SecondaryState>,
}

impl SecondaryApplier {
    pub fn new(name: String, artificial_delay: Duration) -> Self {
        Self {
            name,
            artificial_delay,
            state: Mutex::new(SecondaryState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotently apply a replicated entry, buffering it if it arrives out of order.
    pub async fn replicate(&self, id: u64, payload: String) -> ApplyOutcome {
        if self.artificial_delay > Duration::ZERO {
            tracing::debug!("simulating network delay of {:?}", self.artificial_delay);
            tokio::time::sleep(self.artificial_delay).await;
        }

        let mut state = self.state.lock().await;

        if state.seen_ids.contains(&id) {
            tracing::debug!(id, "duplicate message, skipping");
            return ApplyOutcome {
                success: true,
                message: "Duplicate",
            };
        }

        state.seen_ids.insert(id);

        if id == state.next_expected_id {
            state.applied_log.push(LogEntry {
                id,
                payload,
            });
            state.next_expected_id += 1;
            tracing::debug!(id, "added message to log");
            state.drain_buffer();
        } else {
            tracing::debug!(id, expected = state.next_expected_id, "buffering out-of-order message");
            state.buffer.insert(id, payload);
        }

        ApplyOutcome {
            success: true,
            message: "Success",
        }
    }

    /// Answer a heartbeat with this secondary's current progress.
    pub async fn heartbeat(&self) -> u64 {
        let state = self.state.lock().await;
        state.last_log_id()
    }

    /// All entries after `last_received_id`, in id order.
    pub async fn get_missed_logs(&self, last_received_id: u64) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        state
            .applied_log
            .iter()
            .filter(|e| e.id > last_received_id)
            .cloned()
            .collect()
    }

    /// Snapshot of the applied log, in id order.
    pub async fn read_log(&self) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        state.applied_log.clone()
    }

    /// Counters for the `/health` endpoint.
    pub async fn health(&self) -> SecondaryHealth {
        let state = self.state.lock().await;
        SecondaryHealth {
            last_log_id: state.last_log_id(),
            total_logs: state.applied_log.len(),
            buffered_messages: state.buffer.len(),
            next_expected_id: state.next_expected_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applier() -> SecondaryApplier {
        SecondaryApplier::new("secondary-a".to_string(), Duration::ZERO)
    }

    #[tokio::test]
    async fn in_order_delivery_appends_immediately() {
        let applier = applier();
        applier.replicate(1, "a".into()).await;
        applier.replicate(2, "b".into()).await;

        let log = applier.read_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, 1);
        assert_eq!(log[1].id, 2);
        assert_eq!(applier.heartbeat().await, 2);
    }

    #[tokio::test]
    async fn duplicate_replicate_is_a_no_op() {
        let applier = applier();
        applier.replicate(5, "x".into()).await;
        let first_len = applier.read_log().await.len();

        let outcome = applier.replicate(5, "x".into()).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Duplicate");
        assert_eq!(applier.read_log().await.len(), first_len);
    }

    #[tokio::test]
    async fn reordered_delivery_buffers_until_contiguous() {
        let applier = applier();

        applier.replicate(3, "c".into()).await;
        assert!(applier.read_log().await.is_empty());
        assert_eq!(applier.health().await.next_expected_id, 1);

        applier.replicate(2, "b".into()).await;
        assert!(applier.read_log().await.is_empty());
        assert_eq!(applier.health().await.buffered_messages, 2);

        applier.replicate(1, "a".into()).await;
        let log = applier.read_log().await;
        assert_eq!(log.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(applier.health().await.next_expected_id, 4);
        assert_eq!(applier.health().await.buffered_messages, 0);
    }

    #[tokio::test]
    async fn get_missed_logs_returns_entries_after_cursor() {
        let applier = applier();
        for id in 1..=5u64 {
            applier.replicate(id, format!("m{id}")).await;
        }

        let missed = applier.get_missed_logs(3).await;
        assert_eq!(missed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 5]);
    }
}
