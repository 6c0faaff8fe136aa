//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, heartbeat > 0)
//! - Detect conflicting mount paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address \"{0}\" is not a socket address")]
    InvalidBindAddress(String),

    #[error("{field} \"{path}\" must start with '/'")]
    RelativePath { field: &'static str, path: String },

    #[error("remote.path and sse.path are both \"{0}\"")]
    PathConflict(String),

    #[error("sse.heartbeat_interval_ms must be greater than 0")]
    ZeroHeartbeat,

    #[error("sse.event_buffer must be greater than 0")]
    ZeroEventBuffer,

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroTimeout,

    #[error("observability.metrics_address \"{0}\" is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("security.api_key must not be empty")]
    EmptyApiKey,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    for (field, path) in [("remote.path", &config.remote.path), ("sse.path", &config.sse.path)] {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativePath {
                field,
                path: path.clone(),
            });
        }
    }
    if config.remote.path == config.sse.path {
        errors.push(ValidationError::PathConflict(config.remote.path.clone()));
    }

    if config.sse.heartbeat_interval_ms == 0 {
        errors.push(ValidationError::ZeroHeartbeat);
    }
    if config.sse.event_buffer == 0 {
        errors.push(ValidationError::ZeroEventBuffer);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.security.api_key.as_deref() == Some("") {
        errors.push(ValidationError::EmptyApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.remote.path = "remote".into();
        config.sse.path = "remote".into();
        config.sse.heartbeat_interval_ms = 0;
        config.sse.event_buffer = 0;
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.contains(&ValidationError::ZeroEventBuffer));
        assert!(errors.contains(&ValidationError::PathConflict("remote".into())));
        assert!(errors.contains(&ValidationError::ZeroHeartbeat));
        assert!(errors.contains(&ValidationError::RelativePath {
            field: "sse.path",
            path: "remote".into()
        }));
    }
}
