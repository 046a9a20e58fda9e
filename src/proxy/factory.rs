//! Per-endpoint pipeline assembly.
//!
//! # Responsibilities
//! - Build one stack per backend: request shaping → hedging → terminal call
//! - Merge the stacks of endpoints with several backends
//!
//! # Design Decisions
//! - The stack order is fixed; only the terminal proxy is pluggable
//! - Terminal proxies come from a `BackendFactory` (HTTP by default)

use std::sync::Arc;

use thiserror::Error;

use crate::config::{BackendConfig, EndpointConfig};
use crate::proxy::http::{default_client, HttpClient, HttpProxy};
use crate::proxy::{
    BoxProxy, ConcurrentMiddleware, MergeMiddleware, Pipeline, RequestBuilderMiddleware,
    DEFAULT_MAX_BUFFERED_BODY,
};

/// Errors raised while assembling a pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error("endpoint {0} has no backends")]
    NoBackends(String),
}

/// Creates the terminal proxy for a backend.
pub trait BackendFactory: Send + Sync {
    fn new_backend(&self, backend: &BackendConfig) -> BoxProxy;
}

/// Terminal proxies calling backends over HTTP.
#[derive(Clone)]
pub struct HttpBackendFactory {
    client: HttpClient,
    max_response_body: usize,
}

impl HttpBackendFactory {
    pub fn new(client: HttpClient, max_response_body: usize) -> Self {
        Self {
            client,
            max_response_body,
        }
    }
}

impl Default for HttpBackendFactory {
    fn default() -> Self {
        Self::new(default_client(), 10 * DEFAULT_MAX_BUFFERED_BODY)
    }
}

impl BackendFactory for HttpBackendFactory {
    fn new_backend(&self, backend: &BackendConfig) -> BoxProxy {
        Arc::new(HttpProxy::new(
            self.client.clone(),
            backend,
            self.max_response_body,
        ))
    }
}

/// Builds the pipeline for an endpoint.
#[derive(Clone)]
pub struct ProxyFactory {
    backends: Arc<dyn BackendFactory>,
    max_buffered_body: usize,
}

impl ProxyFactory {
    pub fn new(backends: Arc<dyn BackendFactory>, max_buffered_body: usize) -> Self {
        Self {
            backends,
            max_buffered_body,
        }
    }

    /// A factory whose terminal proxies call backends over HTTP.
    pub fn http(max_buffered_body: usize) -> Self {
        Self::new(Arc::new(HttpBackendFactory::default()), max_buffered_body)
    }

    /// Assemble the pipeline for `endpoint`.
    pub fn new_proxy(&self, endpoint: &EndpointConfig) -> Result<BoxProxy, FactoryError> {
        let mut stacks: Vec<BoxProxy> = endpoint
            .backend
            .iter()
            .map(|backend| self.backend_stack(backend))
            .collect();

        match stacks.len() {
            0 => Err(FactoryError::NoBackends(endpoint.endpoint.clone())),
            1 => Ok(stacks.remove(0)),
            _ => Ok(MergeMiddleware::new(self.max_buffered_body).wrap_all(stacks)),
        }
    }

    fn backend_stack(&self, backend: &BackendConfig) -> BoxProxy {
        Pipeline::new()
            .layer(RequestBuilderMiddleware::new(backend))
            .layer(ConcurrentMiddleware::new(backend, self.max_buffered_body))
            .service(self.backends.new_backend(backend))
    }
}
