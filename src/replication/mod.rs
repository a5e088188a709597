//! Replication
//!
//! The replication and consistency engine: id assignment and ack gathering
//! on the primary, ordering and deduplication on the secondary, the health
//! state machine and quorum controller that sit between them, the wire
//! contract they speak, and the transport that carries it.

pub mod health;
pub mod message;
pub mod primary;
pub mod quorum;
pub mod secondary;
pub mod transport;

pub use message::{LogEntry, Request, Response};
pub use primary::{AppendResult, AppendStatus, PrimaryReplicator};
pub use secondary::SecondaryApplier;
