//! Relaylog configuration
//!
//! Configuration is assembled from an optional TOML file with CLI flags
//! layered on top (CLI wins on conflict). See [`PrimaryConfig`] and
//! [`SecondaryConfig`] for the two node kinds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a primary node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryConfig {
    /// Address each secondary's RPC listener can be reached at, in peer order.
    pub replicas: Vec<String>,

    /// HTTP API bind address.
    #[serde(default = "default_primary_http")]
    pub http_bind: String,

    /// Heartbeat interval.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Elapsed time since last successful heartbeat after which a peer is Suspected.
    #[serde(default = "default_suspected_timeout_ms")]
    pub suspected_timeout_ms: u64,

    /// Elapsed time since last successful heartbeat after which a peer is Unhealthy.
    #[serde(default = "default_unhealthy_timeout_ms")]
    pub unhealthy_timeout_ms: u64,

    /// Bound on how long `Append` waits for acks before returning partial acceptance.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Base exponential backoff delay for replication retries.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the exponential backoff delay for replication retries.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-RPC deadline for `Replicate` and `GetMissedLogs` calls.
    #[serde(default = "default_replication_deadline_ms")]
    pub replication_deadline_ms: u64,

    /// Per-RPC deadline for `Heartbeat` calls.
    #[serde(default = "default_heartbeat_deadline_ms")]
    pub heartbeat_deadline_ms: u64,
}

/// Configuration for a secondary node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    /// Name this secondary reports in `Heartbeat` responses and log lines.
    pub name: String,

    /// RPC listener address (what the primary dials).
    #[serde(default = "default_secondary_rpc")]
    pub rpc_bind: String,

    /// HTTP API bind address.
    #[serde(default = "default_secondary_http")]
    pub http_bind: String,

    /// Artificial delay applied before acquiring the state mutex in `Replicate`,
    /// a fault-injection / latency-testing knob. Zero disables it.
    #[serde(default)]
    pub artificial_delay_ms: u64,
}

impl PrimaryConfig {
    /// Load configuration from a TOML file, validating the result.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, validating the result.
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce sensible behavior.
    pub fn validate(&self) -> crate::Result<()> {
        if self.suspected_timeout_ms >= self.unhealthy_timeout_ms {
            return Err(crate::Error::Config(
                "suspected_timeout_ms must be less than unhealthy_timeout_ms".into(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(crate::Error::Config("base_delay_ms must be non-zero".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(crate::Error::Config(
                "max_delay_ms must be >= base_delay_ms".into(),
            ));
        }
        for addr in &self.replicas {
            if addr.is_empty() {
                return Err(crate::Error::Config("replica address cannot be empty".into()));
            }
        }
        Ok(())
    }

    /// Total node count `T = N + 1` (primary plus every configured replica).
    pub fn total_nodes(&self) -> usize {
        self.replicas.len() + 1
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn suspected_timeout(&self) -> Duration {
        Duration::from_millis(self.suspected_timeout_ms)
    }

    pub fn unhealthy_timeout(&self) -> Duration {
        Duration::from_millis(self.unhealthy_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn replication_deadline(&self) -> Duration {
        Duration::from_millis(self.replication_deadline_ms)
    }

    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.heartbeat_deadline_ms)
    }
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            replicas: Vec::new(),
            http_bind: default_primary_http(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            suspected_timeout_ms: default_suspected_timeout_ms(),
            unhealthy_timeout_ms: default_unhealthy_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            replication_deadline_ms: default_replication_deadline_ms(),
            heartbeat_deadline_ms: default_heartbeat_deadline_ms(),
        }
    }
}

impl SecondaryConfig {
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::Config("name cannot be empty".into()));
        }
        Ok(())
    }

    pub fn artificial_delay(&self) -> Duration {
        Duration::from_millis(self.artificial_delay_ms)
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            name: "secondary".to_string(),
            rpc_bind: default_secondary_rpc(),
            http_bind: default_secondary_http(),
            artificial_delay_ms: 0,
        }
    }
}

fn default_primary_http() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_secondary_rpc() -> String {
    "0.0.0.0:50052".to_string()
}

fn default_secondary_http() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_suspected_timeout_ms() -> u64 {
    10_000
}

fn default_unhealthy_timeout_ms() -> u64 {
    20_000
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    120_000
}

fn default_replication_deadline_ms() -> u64 {
    6_000
}

fn default_heartbeat_deadline_ms() -> u64 {
    3_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_primary_config() {
        let config = PrimaryConfig::from_str(
            r#"
            replicas = ["127.0.0.1:50052", "127.0.0.1:50053"]
        "#,
        )
        .unwrap();

        assert_eq!(config.replicas.len(), 2);
        assert_eq!(config.total_nodes(), 3);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
    }

    #[test]
    fn loads_primary_config_from_a_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.toml");
        std::fs::write(&path, "replicas = [\"127.0.0.1:50052\"]\nhttp_bind = \"127.0.0.1:9090\"\n").unwrap();

        let config = PrimaryConfig::from_file(&path).unwrap();
        assert_eq!(config.replicas, vec!["127.0.0.1:50052".to_string()]);
        assert_eq!(config.http_bind, "127.0.0.1:9090");
    }

    #[test]
    fn rejects_inverted_health_timeouts() {
        let config = PrimaryConfig {
            suspected_timeout_ms: 20_000,
            unhealthy_timeout_ms: 10_000,
            ..PrimaryConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_secondary_config_with_delay() {
        let config = SecondaryConfig::from_str(
            r#"
            name = "secondary-a"
            artificial_delay_ms = 50
        "#,
        )
        .unwrap();

        assert_eq!(config.name, "secondary-a");
        assert_eq!(config.artificial_delay_ms, 50);
    }

    #[test]
    fn rejects_empty_secondary_name() {
        let config = SecondaryConfig {
            name: String::new(),
            ..SecondaryConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
