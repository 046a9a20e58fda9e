//! Per-backend request shaping.
//!
//! # Responsibilities
//! - Render the backend URL pattern with the request's path parameters
//! - Override the method with the backend's method
//!
//! # Design Decisions
//! - Placeholders use the `{{.Key}}` form, keys as produced by the router adapter
//! - Placeholders without a matching parameter stay as literal text
//! - Query, headers and body pass through untouched

use crate::config::BackendConfig;
use crate::proxy::{BoxProxy, Context, Middleware, Params, Proxy, ProxyFuture, Request};

/// Middleware that shapes the request for a single backend.
#[derive(Debug, Clone)]
pub struct RequestBuilderMiddleware {
    url_pattern: String,
    method: String,
}

impl RequestBuilderMiddleware {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            url_pattern: backend.url_pattern.clone(),
            method: backend.method.clone(),
        }
    }
}

impl Middleware for RequestBuilderMiddleware {
    fn wrap(&self, next: BoxProxy) -> BoxProxy {
        std::sync::Arc::new(RequestBuilderProxy {
            url_pattern: self.url_pattern.clone(),
            method: self.method.clone(),
            next,
        })
    }
}

struct RequestBuilderProxy {
    url_pattern: String,
    method: String,
    next: BoxProxy,
}

impl Proxy for RequestBuilderProxy {
    fn call(&self, ctx: Context, mut request: Request) -> ProxyFuture {
        request.path = generate_path(&self.url_pattern, &request.params);
        request.method = self.method.clone();
        self.next.call(ctx, request)
    }
}

/// Substitute every `{{.Key}}` placeholder with the matching parameter.
pub fn generate_path(url_pattern: &str, params: &Params) -> String {
    params
        .iter()
        .fold(url_pattern.to_string(), |path, (key, value)| {
            path.replace(&format!("{{{{.{}}}}}", key), value)
        })
}
