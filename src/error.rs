//! Relaylog error types

use thiserror::Error;

/// Result type alias for relaylog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Relaylog error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Request validation
    #[error("invalid write concern {w}: must be between 1 and {max}")]
    InvalidWriteConcern { w: usize, max: usize },

    #[error("malformed request body: {0}")]
    MalformedRequest(String),

    // Quorum / availability
    #[error("quorum lost: node is in read-only mode")]
    ReadOnly,

    // Replication / RPC
    #[error("RPC deadline exceeded talking to {0}")]
    RpcTimeout(String),

    #[error("connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("frame checksum mismatch from {0}")]
    FrameCorrupted(String),

    #[error("message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}
