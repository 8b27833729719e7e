//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener bind address: {0}")]
    BindAddress(String),
    #[error("listener max_connections must be greater than zero")]
    NoConnections,
    #[error("door has no network specified")]
    NoNetwork,
    #[error("door needs an address unless follow_redirect is set")]
    NoAddress,
    #[error("door port must be non-zero")]
    NoPort,
    #[error("dispatcher connect_timeout_secs must be greater than zero")]
    ConnectTimeout,
    #[error("policy level {0} is defined more than once")]
    DuplicateLevel(u32),
    #[error("invalid metrics address: {0}")]
    MetricsAddress(String),
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }

    let door = &config.door;
    if door.networks.is_empty() {
        errors.push(ValidationError::NoNetwork);
    }
    let has_address = door.address.as_deref().is_some_and(|a| !a.trim().is_empty());
    if !door.follow_redirect && !has_address {
        errors.push(ValidationError::NoAddress);
    }
    if door.port == 0 {
        errors.push(ValidationError::NoPort);
    }

    if config.dispatcher.connect_timeout_secs == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }

    let mut seen = HashSet::new();
    for level in &config.policy.levels {
        if !seen.insert(level.level) {
            errors.push(ValidationError::DuplicateLevel(level.level));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
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
    use crate::config::schema::LevelPolicyConfig;

    fn valid() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.door.address = Some("127.0.0.1".into());
        config.door.port = 8080;
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.door.networks.clear();
        config.door.address = None;
        config.door.port = 0;
        config.policy.levels = vec![LevelPolicyConfig::default(), LevelPolicyConfig::default()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("nowhere".into()),
                ValidationError::NoNetwork,
                ValidationError::NoAddress,
                ValidationError::NoPort,
                ValidationError::DuplicateLevel(0),
            ]
        );
    }

    #[test]
    fn follow_redirect_needs_no_address() {
        let mut config = valid();
        config.door.address = None;
        config.door.follow_redirect = true;
        assert!(validate_config(&config).is_ok());
    }
}
