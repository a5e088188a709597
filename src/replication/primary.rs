//! Primary Replicator
//!
//! Assigns ids, fans writes out to secondaries, collects acks up to a
//! per-request write concern `w`, and keeps retrying failed peers forever
//! with backoff while a background heartbeat loop drives peer health and
//! catch-up resync.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex, RwLock};

use crate::config::PrimaryConfig;
use crate::error::{Error, Result};
use crate::replication::health::{HealthStatus, PeerDescriptor};
use crate::replication::message::{LogEntry, Request, Response};
use crate::replication::quorum::QuorumController;
use crate::replication::transport::PeerTransport;

/// Outcome of a single `Append` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    Committed,
    PartiallyAccepted,
}

#[derive(Debug, Clone)]
pub struct AppendResult {
    pub id: u64,
    pub acks: usize,
    pub status: AppendStatus,
}

/// A single peer as addressed by the primary: a stable name plus its RPC address.
#[derive(Debug, Clone)]
struct Peer {
    name: String,
    address: String,
}

struct AckEntry {
    count: usize,
    required: usize,
    /// Taken and fired the first time `count` reaches `required` ("arm once").
    signal: Option<oneshot::Sender<()>>,
}

/// Snapshot of one peer's health, for the primary `/health` endpoint.
pub struct PeerHealthSnapshot {
    pub status: HealthStatus,
    pub last_check: Instant,
    pub last_log_id: u64,
}

pub struct HealthSnapshot {
    pub read_only: bool,
    pub peers: HashMap<String, PeerHealthSnapshot>,
}

/// The primary's replication and consistency engine.
pub struct PrimaryReplicator {
    config: PrimaryConfig,
    transport: Arc<dyn PeerTransport>,
    peers: Vec<Peer>,
    log: Mutex<Vec<LogEntry>>,
    acks: Mutex<HashMap<u64, AckEntry>>,
    health: RwLock<HashMap<String, PeerDescriptor>>,
    quorum: QuorumController,
}

impl PrimaryReplicator {
    pub fn new(config: PrimaryConfig, transport: Arc<dyn PeerTransport>) -> Arc<Self> {
        let peers: Vec<Peer> = config
            .replicas
            .iter()
            .enumerate()
            .map(|(i, address)| Peer {
                name: format!("secondary-{}", i + 1),
                address: address.clone(),
            })
            .collect();

        let health = peers
            .iter()
            .map(|p| (p.name.clone(), PeerDescriptor::new(p.address.clone())))
            .collect();

        Arc::new(Self {
            config,
            transport,
            peers,
            log: Mutex::new(Vec::new()),
            acks: Mutex::new(HashMap::new()),
            health: RwLock::new(health),
            quorum: QuorumController::new(),
        })
    }

    pub fn total_nodes(&self) -> usize {
        self.config.total_nodes()
    }

    /// Assign an id, store locally, fan out to every peer, and wait (bounded) for `w` acks.
    pub async fn append(self: &Arc<Self>, payload: String, w: usize) -> Result<AppendResult> {
        if w == 0 || w > self.total_nodes() {
            return Err(Error::InvalidWriteConcern {
                w,
                max: self.total_nodes(),
            });
        }

        if self.quorum.is_read_only() {
            return Err(Error::ReadOnly);
        }

        let id = {
            let mut log = self.log.lock().await;
            let id = log.len() as u64 + 1;
            log.push(LogEntry {
                id,
                payload: payload.clone(),
            });
            id
        };
        tracing::info!(id, w, "assigned id");

        let (tx, rx) = oneshot::channel();
        {
            let mut acks = self.acks.lock().await;
            let mut entry = AckEntry {
                count: 1,
                required: w,
                signal: Some(tx),
            };
            if entry.count >= entry.required {
                if let Some(signal) = entry.signal.take() {
                    let _ = signal.send(());
                }
            }
            acks.insert(id, entry);
        }

        for peer in &self.peers {
            let this = Arc::clone(self);
            let peer = peer.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                this.replicate_with_retry(&peer, id, payload).await;
            });
        }

        let _ = tokio::time::timeout(self.config.request_timeout(), rx).await;

        let acks = {
            let mut table = self.acks.lock().await;
            table.remove(&id).map(|e| e.count).unwrap_or(0)
        };

        let status = if acks >= w {
            AppendStatus::Committed
        } else {
            AppendStatus::PartiallyAccepted
        };

        Ok(AppendResult { id, acks, status })
    }

    pub async fn read_log(&self) -> Vec<LogEntry> {
        self.log.lock().await.clone()
    }

    pub async fn health(&self) -> HealthSnapshot {
        let health = self.health.read().await;
        let peers = health
            .iter()
            .map(|(name, desc)| {
                (
                    name.clone(),
                    PeerHealthSnapshot {
                        status: desc.status,
                        last_check: desc.last_check,
                        last_log_id: desc.last_log_id,
                    },
                )
            })
            .collect();

        HealthSnapshot {
            read_only: self.quorum.is_read_only(),
            peers,
        }
    }

    /// Replicate `(id, payload)` to one peer, retrying forever with backoff until it acks.
    async fn replicate_with_retry(self: &Arc<Self>, peer: &Peer, id: u64, payload: String) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(id, peer = %peer.name, attempt, "replication attempt");
            let request = Request::Replicate(LogEntry {
                id,
                payload: payload.clone(),
            });

            let outcome = self
                .transport
                .call(&peer.address, request, self.config.replication_deadline())
                .await;

            match outcome {
                Ok(Response::LogAck { success: true, .. }) => {
                    self.on_replication_success(peer, id).await;
                    return;
                }
                Ok(other) => {
                    tracing::warn!(
                        "unexpected response replicating {} to {}: {:?}",
                        id,
                        peer.name,
                        other
                    );
                }
                Err(e) => {
                    tracing::warn!("replication of {} to {} failed: {}", id, peer.name, e);
                }
            }

            let status = self.on_replication_failure(peer).await;
            let delay = self.backoff_delay(attempt, status);
            tracing::debug!(id, peer = %peer.name, delay_ms = delay.as_millis() as u64, "retry backoff");
            tokio::time::sleep(delay).await;
        }
    }

    async fn on_replication_success(&self, peer: &Peer, last_log_id: u64) {
        {
            let mut acks = self.acks.lock().await;
            if let Some(entry) = acks.get_mut(&last_log_id) {
                entry.count += 1;
                if entry.count >= entry.required {
                    if let Some(signal) = entry.signal.take() {
                        let _ = signal.send(());
                    }
                }
            }
        }

        let mut health = self.health.write().await;
        if let Some(desc) = health.get_mut(&peer.name) {
            desc.record_heartbeat_success(last_log_id);
        }
    }

    async fn on_replication_failure(&self, peer: &Peer) -> HealthStatus {
        let mut health = self.health.write().await;
        match health.get_mut(&peer.name) {
            Some(desc) => desc.refresh_status(self.config.suspected_timeout(), self.config.unhealthy_timeout()),
            None => HealthStatus::Unhealthy,
        }
    }

    fn backoff_delay(&self, attempt: u32, status: HealthStatus) -> Duration {
        if status == HealthStatus::Unhealthy {
            return self.config.max_delay();
        }
        let base = self.config.base_delay_ms;
        let max = self.config.max_delay_ms;
        let scaled = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(62));
        Duration::from_millis(scaled.min(max))
    }

    /// Background heartbeat loop: run forever, one pass every `heartbeat_interval`.
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.heartbeat_interval());
            loop {
                ticker.tick().await;
                this.run_heartbeat_pass().await;
            }
        })
    }

    async fn run_heartbeat_pass(self: &Arc<Self>) {
        for peer in &self.peers {
            let request = Request::Heartbeat {
                secondary_name: "primary".to_string(),
            };
            let outcome = self
                .transport
                .call(&peer.address, request, self.config.heartbeat_deadline())
                .await;

            let transitioned_to_healthy = match outcome {
                Ok(Response::HeartbeatResp { last_log_id, .. }) => {
                    let mut health = self.health.write().await;
                    match health.get_mut(&peer.name) {
                        Some(desc) => desc.record_heartbeat_success(last_log_id),
                        None => false,
                    }
                }
                _ => {
                    let mut health = self.health.write().await;
                    if let Some(desc) = health.get_mut(&peer.name) {
                        let before = desc.status;
                        let after = desc.refresh_status(self.config.suspected_timeout(), self.config.unhealthy_timeout());
                        if after != before {
                            tracing::info!(peer = %peer.name, from = %before, to = %after, "peer health transition");
                        }
                    }
                    false
                }
            };

            if transitioned_to_healthy {
                tracing::info!(peer = %peer.name, to = %HealthStatus::Healthy, "peer health transition");
                let this = Arc::clone(self);
                let peer = peer.clone();
                tokio::spawn(async move {
                    this.resync_peer(&peer).await;
                });
            }
        }

        self.update_quorum().await;
    }

    async fn update_quorum(&self) {
        let healthy = {
            let health = self.health.read().await;
            health.values().filter(|d| d.status == HealthStatus::Healthy).count()
        };
        let was_read_only = self.quorum.is_read_only();
        self.quorum.update(self.total_nodes(), healthy);
        let is_read_only = self.quorum.is_read_only();
        if is_read_only != was_read_only {
            if is_read_only {
                tracing::warn!(healthy, total = self.total_nodes(), "quorum lost, entering read-only mode");
            } else {
                tracing::info!(healthy, total = self.total_nodes(), "quorum restored, leaving read-only mode");
            }
        }
    }

    /// Catch a peer up on everything it missed, outside write-concern accounting.
    async fn resync_peer(self: &Arc<Self>, peer: &Peer) {
        let last_log_id = {
            let health = self.health.read().await;
            health.get(&peer.name).map(|d| d.last_log_id).unwrap_or(0)
        };

        let missing: Vec<LogEntry> = {
            let log = self.log.lock().await;
            log.iter().filter(|e| e.id > last_log_id).cloned().collect()
        };

        for entry in missing {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let request = Request::Replicate(entry.clone());
                let outcome = self
                    .transport
                    .call(&peer.address, request, self.config.replication_deadline())
                    .await;

                match outcome {
                    Ok(Response::LogAck { success: true, .. }) => {
                        let mut health = self.health.write().await;
                        if let Some(desc) = health.get_mut(&peer.name) {
                            desc.record_heartbeat_success(entry.id);
                        }
                        break;
                    }
                    _ => {
                        tracing::warn!("resync of {} to {} failed, retrying", entry.id, peer.name);
                        let status = self.on_replication_failure(peer).await;
                        tokio::time::sleep(self.backoff_delay(attempt, status)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory peer double: always acks, lets tests avoid real sockets.
    struct AlwaysAck {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PeerTransport for AlwaysAck {
        async fn call(&self, _address: &str, request: Request, _deadline: Duration) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request {
                Request::Replicate(entry) => Ok(Response::LogAck {
                    success: true,
                    message: format!("ok {}", entry.id),
                }),
                Request::Heartbeat { .. } => Ok(Response::HeartbeatResp {
                    status: "Healthy".to_string(),
                    last_log_id: 0,
                }),
                Request::GetMissedLogs { .. } => Ok(Response::MissedResp { entries: vec![] }),
            }
        }
    }

    /// Peer double that always fails, to exercise health/backoff without waiting on real retries.
    struct AlwaysFail;

    #[async_trait::async_trait]
    impl PeerTransport for AlwaysFail {
        async fn call(&self, address: &str, _request: Request, _deadline: Duration) -> Result<Response> {
            Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    fn config(replicas: usize) -> PrimaryConfig {
        PrimaryConfig {
            replicas: (0..replicas).map(|i| format!("127.0.0.1:{}", 6000 + i)).collect(),
            ..PrimaryConfig::default()
        }
    }

    #[tokio::test]
    async fn w_one_commits_on_self_ack_alone() {
        let primary = PrimaryReplicator::new(config(2), Arc::new(AlwaysAck { calls: AtomicUsize::new(0) }));
        let result = primary.append("a".to_string(), 1).await.unwrap();

        assert_eq!(result.id, 1);
        assert!(result.acks >= 1);
        assert_eq!(result.status, AppendStatus::Committed);
    }

    #[tokio::test]
    async fn ids_are_dense_across_successive_appends() {
        let primary = PrimaryReplicator::new(config(0), Arc::new(AlwaysAck { calls: AtomicUsize::new(0) }));

        for expected in 1..=5u64 {
            let result = primary.append(format!("m{expected}"), 1).await.unwrap();
            assert_eq!(result.id, expected);
        }

        let log = primary.read_log().await;
        assert_eq!(log.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn write_concern_above_total_nodes_is_rejected() {
        let primary = PrimaryReplicator::new(config(1), Arc::new(AlwaysAck { calls: AtomicUsize::new(0) }));
        let result = primary.append("a".to_string(), 5).await;
        assert!(matches!(result, Err(Error::InvalidWriteConcern { .. })));
    }

    #[tokio::test]
    async fn read_only_mode_rejects_append_without_assigning_id() {
        let primary = PrimaryReplicator::new(config(2), Arc::new(AlwaysFail));
        primary.quorum.update(primary.total_nodes(), 0);

        let result = primary.append("a".to_string(), 1).await;
        assert!(matches!(result, Err(Error::ReadOnly)));
        assert!(primary.read_log().await.is_empty());
    }

    #[tokio::test]
    async fn eventually_healthy_peer_reaches_quorum() {
        let primary = PrimaryReplicator::new(config(2), Arc::new(AlwaysAck { calls: AtomicUsize::new(0) }));
        primary.append("a".to_string(), 1).await.unwrap();

        // Give the detached replication tasks a moment to run and mark peers healthy.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = primary.health().await;
        assert!(snapshot.peers.values().any(|p| p.status == HealthStatus::Healthy));
    }

    /// Peer double that fails the first `failures` calls, then acks. Lets a test
    /// observe partial acceptance without waiting out a real retry backoff.
    struct FlakyThenAck {
        failures: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PeerTransport for FlakyThenAck {
        async fn call(&self, address: &str, request: Request, _deadline: Duration) -> Result<Response> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: "simulated drop".to_string(),
                });
            }
            match request {
                Request::Replicate(entry) => Ok(Response::LogAck {
                    success: true,
                    message: format!("ok {}", entry.id),
                }),
                Request::Heartbeat { .. } => Ok(Response::HeartbeatResp {
                    status: "Healthy".to_string(),
                    last_log_id: 0,
                }),
                Request::GetMissedLogs { .. } => Ok(Response::MissedResp { entries: vec![] }),
            }
        }
    }

    #[tokio::test]
    async fn request_timeout_of_zero_yields_partial_acceptance_when_peers_lag() {
        let mut cfg = config(2);
        cfg.request_timeout_ms = 0;
        let primary = PrimaryReplicator::new(
            cfg,
            Arc::new(FlakyThenAck {
                failures: AtomicUsize::new(1_000_000),
            }),
        );

        let result = primary.append("a".to_string(), 3).await.unwrap();

        assert_eq!(result.status, AppendStatus::PartiallyAccepted);
        assert_eq!(result.acks, 1);
        // The entry is durable on the primary regardless of the partial outcome.
        assert_eq!(primary.read_log().await.len(), 1);
    }
}
