//! relaylog - a replicated append-only log with tunable write concern.
//!
//! A single primary assigns each message a monotonically increasing id,
//! persists it locally, and fans it out to N passive secondaries. A
//! per-request write concern `w` controls how many acknowledgments
//! (including the primary's own) the client waits for before the primary
//! responds. Secondaries apply messages in total order by id, deduplicate
//! replays, and buffer out-of-order arrivals until a contiguous prefix is
//! achievable.
//!
//! # Architecture
//!
//! [`replication::PrimaryReplicator`] owns id assignment, ack gathering,
//! the heartbeat-driven peer health state machine, and quorum-gated
//! read-only fallback. [`replication::SecondaryApplier`] owns idempotent
//! apply, buffering, and catch-up. [`api`] exposes both over HTTP;
//! [`replication::transport`] carries the peer RPCs between them.

pub mod api;
pub mod config;
pub mod error;
pub mod replication;

pub use config::{PrimaryConfig, SecondaryConfig};
pub use error::{Error, Result};

/// Re-export of the most commonly used types.
pub mod prelude {
    pub use crate::config::{PrimaryConfig, SecondaryConfig};
    pub use crate::error::{Error, Result};
    pub use crate::replication::{AppendResult, AppendStatus, LogEntry, PrimaryReplicator, SecondaryApplier};
}
