//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs after CLI overrides, before anything binds

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a socket address")]
    Address { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("rules.origin must not be empty")]
    EmptyOrigin,
}

/// Checks `config`, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_header_bytes"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_body_bytes"));
    }
    if config.rules.origin.trim().is_empty() {
        errors.push(ValidationError::EmptyOrigin);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "localhost".to_string();
        config.listener.max_connections = 0;
        config.rules.origin = "  ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::Address {
                    field: "listener.bind_address",
                    value: "localhost".to_string(),
                },
                ValidationError::Zero("listener.max_connections"),
                ValidationError::EmptyOrigin,
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
