//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Durations are written as humantime strings (`"2s"`, `"150ms"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proxy::DEFAULT_MAX_BUFFERED_BODY;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name, used in logs.
    pub name: String,

    /// Version advertised in the gateway identity header.
    pub version: Option<String>,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Default backend hosts for backends that declare none.
    pub host: Vec<String>,

    /// Default endpoint timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Default endpoint cache TTL; zero disables caching.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Largest request body buffered for hedged or merged calls, in bytes.
    pub max_buffered_body: usize,

    /// Register the debug endpoint.
    pub debug: bool,

    /// Endpoint definitions.
    pub endpoints: Vec<EndpointConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "edge-gateway".to_string(),
            version: None,
            listener: ListenerConfig::default(),
            host: Vec::new(),
            timeout: Duration::from_secs(2),
            cache_ttl: Duration::ZERO,
            max_buffered_body: DEFAULT_MAX_BUFFERED_BODY,
            debug: false,
            endpoints: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Fill inherited values down the service → endpoint → backend chain.
    pub fn normalize(&mut self) {
        for endpoint in &mut self.endpoints {
            endpoint.method = endpoint.method.to_uppercase();
            if endpoint.timeout.is_zero() {
                endpoint.timeout = self.timeout;
            }
            if endpoint.cache_ttl.is_zero() {
                endpoint.cache_ttl = self.cache_ttl;
            }

            for backend in &mut endpoint.backend {
                backend.method = if backend.method.is_empty() {
                    endpoint.method.clone()
                } else {
                    backend.method.to_uppercase()
                };
                if backend.timeout.is_zero() {
                    backend.timeout = endpoint.timeout;
                }
                if backend.host.is_empty() {
                    backend.host = self.host.clone();
                }
                backend.concurrent_calls = backend.concurrent_calls.max(1);
            }
        }
    }
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

/// A gateway-facing endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Path pattern, e.g. `/users/{id}`.
    pub endpoint: String,

    /// Accepted HTTP method.
    pub method: String,

    /// Request-scoped deadline; zero inherits the service timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Cache TTL for complete responses; zero inherits the service value.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Query parameters forwarded to backends, or `["*"]` for all.
    pub query_string: Vec<String>,

    /// Headers forwarded to backends, or `["*"]` for all.
    pub headers_to_pass: Vec<String>,

    /// Render name; defaults to the single backend's encoding.
    pub output_encoding: Option<String>,

    /// Backends called for this endpoint.
    pub backend: Vec<BackendConfig>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: "GET".to_string(),
            timeout: Duration::ZERO,
            cache_ttl: Duration::ZERO,
            query_string: Vec::new(),
            headers_to_pass: Vec::new(),
            output_encoding: None,
            backend: Vec::new(),
        }
    }
}

/// An upstream service called on behalf of an endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URLs, e.g. `http://users:8080`; empty inherits the service hosts.
    pub host: Vec<String>,

    /// Backend path with `{{.Key}}` placeholders.
    pub url_pattern: String,

    /// Method used for the backend call; empty inherits the endpoint method.
    pub method: String,

    /// Identical calls issued per request.
    pub concurrent_calls: usize,

    /// Per-call timeout; zero inherits the endpoint timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Response encoding: `json`, `string` or `noop`.
    pub encoding: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: Vec::new(),
            url_pattern: String::new(),
            method: String::new(),
            concurrent_calls: 1,
            timeout: Duration::ZERO,
            encoding: "json".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `json` for structured output, anything else for human-readable logs.
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
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
