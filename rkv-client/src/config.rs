//! # Client Configuration
//!
//! Everything the pool and invoker read at construction. Durations are
//! expressed as integer milliseconds in serialized form, e.g.
//!
//! ```json
//! { "addresses": ["10.0.0.5:6379"], "max_connections": 4, "io_timeout": 500 }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the client, its pool and its retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend addresses, e.g. "127.0.0.1:6379". The first is the default.
    pub addresses: Vec<String>,
    /// Maximum live connections (idle + in-use) per address.
    pub max_connections: usize,
    /// Maximum idle connections kept per address.
    pub max_idle: usize,
    /// TCP connect timeout.
    #[serde(with = "duration_ms")]
    pub dial_timeout: Duration,
    /// Read/write timeout for each command; `None` blocks indefinitely.
    #[serde(with = "option_duration_ms")]
    pub io_timeout: Option<Duration>,
    /// How long `acquire` blocks when the address is at its bound.
    #[serde(with = "duration_ms")]
    pub wait_timeout: Duration,
    /// Idle age after which a pooled connection is pinged before reuse.
    #[serde(with = "duration_ms")]
    pub stale_after: Duration,
    /// Timeout of the liveness round-trip.
    #[serde(with = "duration_ms")]
    pub liveness_timeout: Duration,
    /// Attempts per command for transport and protocol failures.
    pub max_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addresses: vec!["127.0.0.1:6379".to_string()],
            max_connections: 16,
            max_idle: 8,
            dial_timeout: Duration::from_secs(1),
            io_timeout: Some(Duration::from_secs(3)),
            wait_timeout: Duration::from_secs(1),
            stale_after: Duration::from_secs(30),
            liveness_timeout: Duration::from_millis(200),
            max_attempts: 3,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at a single address.
    pub fn for_address(addr: impl Into<String>) -> Self {
        ClientConfig {
            addresses: vec![addr.into()],
            ..ClientConfig::default()
        }
    }

    /// Parses and validates a JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|err| ClientError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| ClientError::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_json_str(&json)
    }

    /// First configured address.
    pub fn default_address(&self) -> ClientResult<&str> {
        self.addresses
            .first()
            .map(String::as_str)
            .ok_or_else(|| ClientError::Config("no backend addresses".to_string()))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.addresses.is_empty() {
            return Err(ClientError::Config("no backend addresses".to_string()));
        }
        for addr in &self.addresses {
            if !is_host_port(addr) {
                return Err(ClientError::Config(format!("address {:?} is not host:port", addr)));
            }
        }
        if self.max_connections == 0 {
            return Err(ClientError::Config("max_connections must be at least 1".to_string()));
        }
        if self.max_idle > self.max_connections {
            return Err(ClientError::Config(
                "max_idle cannot exceed max_connections".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ClientError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.dial_timeout.is_zero() || self.liveness_timeout.is_zero() {
            return Err(ClientError::Config("timeouts must be non-zero".to_string()));
        }
        if self.io_timeout == Some(Duration::ZERO) {
            return Err(ClientError::Config("io_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_address().unwrap(), "127.0.0.1:6379");
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{ "addresses": ["10.0.0.5:6380"], "max_connections": 4, "max_idle": 2, "io_timeout": 500 }"#,
        )
        .unwrap();
        assert_eq!(config.addresses, vec!["10.0.0.5:6380".to_string()]);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.io_timeout, Some(Duration::from_millis(500)));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.dial_timeout, Duration::from_secs(1));
    }

    #[test]
    fn null_io_timeout_disables_it() {
        let config = ClientConfig::from_json_str(r#"{ "io_timeout": null }"#).unwrap();
        assert_eq!(config.io_timeout, None);
    }

    #[test]
    fn json_roundtrip() {
        let config = ClientConfig::for_address("cache.internal:7000");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ClientConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            r#"{ "addresses": [] }"#,
            r#"{ "addresses": ["no-port"] }"#,
            r#"{ "max_connections": 0, "max_idle": 0 }"#,
            r#"{ "max_connections": 2, "max_idle": 3 }"#,
            r#"{ "max_attempts": 0 }"#,
            r#"{ "dial_timeout": 0 }"#,
            r#"{ "max_connections": "many" }"#,
        ];
        for json in cases {
            assert!(
                matches!(ClientConfig::from_json_str(json), Err(ClientError::Config(_))),
                "accepted {}",
                json
            );
        }
    }
}
