//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::multipart::Limits;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Remote function endpoint.
    pub remote: RemoteConfig,

    /// Server-sent events endpoint.
    pub sse: SseConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shared-secret authentication.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Remote function endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Mount path of the dispatcher.
    pub path: String,

    /// Maximum multipart body size in bytes (0 = unlimited).
    pub max_request_size: usize,

    /// Maximum size of a single part in bytes (0 = unlimited).
    pub max_field_size: usize,
}

impl RemoteConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_request_size: self.max_request_size,
            max_field_size: self.max_field_size,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            path: "/remote".to_string(),
            max_request_size: 16 * 1024 * 1024,
            max_field_size: 8 * 1024 * 1024,
        }
    }
}

/// Server-sent events configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SseConfig {
    /// Mount path of the event stream.
    pub path: String,

    /// Milliseconds of silence before a heartbeat frame.
    pub heartbeat_interval_ms: u64,

    /// Frames queued per connection before a slow peer is disconnected.
    pub event_buffer: usize,
}

impl SseConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            path: "/events".to_string(),
            heartbeat_interval_ms: 10_000,
            event_buffer: 256,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request timeout in seconds. Applies to RPC calls, not to
    /// the body of an open event stream.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// "json" for machine-readable logs, anything else for the human format.
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// When set, requests must carry it in the `x-api-key` header.
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.remote.path, "/remote");
        assert_eq!(config.sse.heartbeat_interval(), Duration::from_secs(10));
        assert!(config.security.api_key.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            [remote]
            max_field_size = 0

            [sse]
            heartbeat_interval_ms = 250

            [security]
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.path, "/remote");
        assert_eq!(
            config.remote.limits(),
            Limits {
                max_request_size: 16 * 1024 * 1024,
                max_field_size: 0
            }
        );
        assert_eq!(config.sse.heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(config.security.api_key.as_deref(), Some("secret"));
    }
}
