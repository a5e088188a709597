//! HTTP API
//!
//! Thin axum routers over the primary and secondary replication engines.

pub mod primary;
pub mod secondary;
