//! Quorum & mode controller
//!
//! Aggregates peer health into a single read/write availability decision.

use std::sync::atomic::{AtomicBool, Ordering};

/// Given total node count `T = N + 1` and the number of Healthy peers `h`,
/// a quorum exists iff `h + 1 >= floor(T/2) + 1`.
pub fn has_quorum(total_nodes: usize, healthy_peers: usize) -> bool {
    healthy_peers + 1 >= total_nodes / 2 + 1
}

/// Tracks whether the primary is currently in read-only mode due to lost quorum.
/// A thin atomic wrapper: the heartbeat loop is the sole writer, HTTP handlers
/// are readers, so no async lock is needed.
#[derive(Debug, Default)]
pub struct QuorumController {
    read_only: AtomicBool,
}

impl QuorumController {
    pub fn new() -> Self {
        Self {
            read_only: AtomicBool::new(false),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// Recompute read-only mode from the current health snapshot.
    pub fn update(&self, total_nodes: usize, healthy_peers: usize) {
        self.read_only
            .store(!has_quorum(total_nodes, healthy_peers), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_node_cluster_needs_one_healthy_peer() {
        // T=3, quorum = floor(3/2)+1 = 2, so primary (1) + 1 healthy peer suffices.
        assert!(has_quorum(3, 1));
        assert!(!has_quorum(3, 0));
    }

    #[test]
    fn five_node_cluster_needs_two_healthy_peers() {
        // T=5, quorum = floor(5/2)+1 = 3, primary (1) + 2 healthy peers suffices.
        assert!(has_quorum(5, 2));
        assert!(!has_quorum(5, 1));
    }

    #[test]
    fn controller_flips_to_read_only_on_quorum_loss() {
        let controller = QuorumController::new();
        assert!(!controller.is_read_only());

        controller.update(3, 0);
        assert!(controller.is_read_only());

        controller.update(3, 1);
        assert!(!controller.is_read_only());
    }
}
