//! Response rendering subsystem.
//!
//! # Data Flow
//! ```text
//! EndpointHandler (pipeline Outcome)
//!     → RenderRegistry::resolve (once per endpoint, at registration)
//!     → Render (inbound headers, Option<Response>) → HTTP response
//! ```
//!
//! # Design Decisions
//! - The registry is constructed explicitly and injected into the handler factory
//! - Registration is additive and may happen while requests are in flight;
//!   entries live in a `DashMap` shared behind an `Arc`
//! - Unknown encodings fall back to `json`

pub mod builtin;
pub mod xml;

use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;

use crate::config::EndpointConfig;
use crate::proxy::Response;

/// Registry key of the JSON render.
pub const JSON: &str = "json";
/// Registry key of the raw-text render.
pub const STRING: &str = "string";
/// Registry key of the passthrough render.
pub const NOOP: &str = "noop";
/// Registry key of the content-negotiating render.
pub const NEGOTIATE: &str = "negotiate";

/// Writes a pipeline response as an HTTP response.
///
/// Receives the inbound request headers (for negotiation) and the response,
/// which is `None` when the pipeline produced nothing.
pub type Render =
    Arc<dyn Fn(&HeaderMap, Option<Response>) -> axum::response::Response + Send + Sync>;

/// Named render functions.
#[derive(Clone)]
pub struct RenderRegistry {
    renders: Arc<DashMap<String, Render>>,
}

impl Default for RenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderRegistry {
    /// A registry holding the built-in renders.
    pub fn new() -> Self {
        let registry = Self {
            renders: Arc::new(DashMap::new()),
        };
        registry.register(JSON, builtin::json);
        registry.register(STRING, builtin::string);
        registry.register(NOOP, builtin::noop);
        registry.register(NEGOTIATE, builtin::negotiate);
        registry
    }

    /// Add or replace a render.
    pub fn register<F>(&self, name: impl Into<String>, render: F)
    where
        F: Fn(&HeaderMap, Option<Response>) -> axum::response::Response + Send + Sync + 'static,
    {
        self.renders.insert(name.into(), Arc::new(render));
    }

    pub fn get(&self, name: &str) -> Option<Render> {
        self.renders.get(name).map(|entry| entry.value().clone())
    }

    /// Pick the render for an endpoint.
    ///
    /// `output_encoding` wins; otherwise a single backend's encoding is used;
    /// otherwise JSON. Names that are not registered resolve to JSON.
    pub fn resolve(&self, endpoint: &EndpointConfig) -> Render {
        let name = match (&endpoint.output_encoding, endpoint.backend.as_slice()) {
            (Some(name), _) => name.as_str(),
            (None, [backend]) => backend.encoding.as_str(),
            (None, _) => JSON,
        };

        self.get(name).unwrap_or_else(|| {
            tracing::debug!(
                encoding = name,
                endpoint = %endpoint.endpoint,
                "Unknown encoding, rendering JSON"
            );
            self.get(JSON).unwrap_or_else(|| Arc::new(builtin::json))
        })
    }
}
