//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, bind address parses)
//! - Detect conflicting endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs after normalization, before config is accepted into the system
//! - Method and backend-count rules are registration-time checks, not load errors

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("service timeout must be greater than zero")]
    ZeroTimeout,

    #[error("endpoint {0:?} must start with '/'")]
    EndpointPath(String),

    #[error("endpoint {endpoint:?} backend #{index} has no host")]
    MissingHost { endpoint: String, index: usize },

    #[error("endpoint {endpoint:?} is declared twice for {method}")]
    DuplicateEndpoint { endpoint: String, method: String },
}

/// Check a normalized configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeout.is_zero() {
        errors.push(ValidationError::ZeroTimeout);
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !endpoint.endpoint.starts_with('/') {
            errors.push(ValidationError::EndpointPath(endpoint.endpoint.clone()));
        }

        for (index, backend) in endpoint.backend.iter().enumerate() {
            if backend.host.is_empty() {
                errors.push(ValidationError::MissingHost {
                    endpoint: endpoint.endpoint.clone(),
                    index,
                });
            }
        }

        if !seen.insert((endpoint.endpoint.as_str(), endpoint.method.as_str())) {
            errors.push(ValidationError::DuplicateEndpoint {
                endpoint: endpoint.endpoint.clone(),
                method: endpoint.method.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
