//! Router adapter subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceConfig.endpoints
//!     → register_endpoints (method / backend-count rules, log + skip)
//!     → ProxyFactory::new_proxy (pipeline per endpoint)
//!     → HandlerFactory::build (endpoint.rs)
//!     → Engine::handle(pattern, method, handler)
//!     → AxumEngine::into_router → axum::Router
//! ```
//!
//! # Design Decisions
//! - Registration problems never reach request time: the endpoint is logged
//!   and left out, so requests to it get the router's ordinary 404
//! - Patterns are checked against a `matchit` tree before they reach axum, so
//!   a conflicting or malformed pattern is a registration error, not a panic
//! - Every verb on a registered path reaches an endpoint handler, which
//!   answers the ones it does not serve with its own 405
//! - The engine captures raw path parameters into the request extensions;
//!   `request::PathParamsExtractor` turns them into pipeline params
//! - Response header names and values below are a stable contract

pub mod debug;
pub mod endpoint;
pub mod request;

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::http::{HeaderName, Method};
use axum::response::Response;
use axum::routing::{MethodFilter, MethodRouter};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::{EndpointConfig, ServiceConfig};
use crate::proxy::factory::FactoryError;
use crate::proxy::ProxyFactory;

pub use endpoint::{EndpointHandler, HandlerFactory, ToHttpStatus};
pub use request::{ParamExtractor, PathParams, PathParamsExtractor, RequestBuilder};

/// Gateway identity header, present on every endpoint response.
pub const GATEWAY_HEADER: HeaderName = HeaderName::from_static("x-gateway");
/// Completeness marker header.
pub const COMPLETED_HEADER: HeaderName = HeaderName::from_static("x-gateway-completed");
/// Every backend answered in time.
pub const HEADER_COMPLETE: &str = "complete";
/// Some backend data is missing, or the request failed.
pub const HEADER_INCOMPLETE: &str = "incomplete";

/// Pattern of the debug endpoint.
pub const DEBUG_PATTERN: &str = "/__debug/{*params}";

/// Methods an endpoint may be registered for.
pub const SUPPORTED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// `X-Gateway` value for a service version.
pub fn gateway_header_value(version: Option<&str>) -> String {
    format!("Version {}", version.unwrap_or("undefined"))
}

/// `User-Agent` sent to backends.
pub fn user_agent_value(version: Option<&str>) -> String {
    format!("EdgeGateway Version {}", version.unwrap_or("undefined"))
}

/// Why an endpoint was not registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("{method} endpoints must have a single backend, {endpoint} has {backends}")]
    TooManyBackends {
        endpoint: String,
        method: String,
        backends: usize,
    },

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error("{method} {pattern} is already registered")]
    Duplicate { pattern: String, method: String },

    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Type-erased request handler.
pub type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Erase an async handler function.
pub fn route_handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// Registers handlers for exact pattern + method pairs.
pub trait Engine {
    fn handle(
        &mut self,
        pattern: &str,
        method: Method,
        handler: RouteHandler,
    ) -> Result<(), RegistrationError>;
}

/// Engine backed by `axum::Router`.
///
/// Methods without a handler of their own fall back to the last handler
/// registered for the pattern.
#[derive(Default)]
pub struct AxumEngine {
    routes: BTreeMap<String, MethodRouter>,
    registered: HashSet<(String, Method)>,
    patterns: matchit::Router<()>,
}

impl AxumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_router(self) -> axum::Router {
        self.routes
            .into_iter()
            .fold(axum::Router::new(), |router, (pattern, methods)| {
                router.route(&pattern, methods)
            })
    }

    /// Reject what `axum::Router::route` would panic on.
    fn check_pattern(&mut self, pattern: &str) -> Result<(), RegistrationError> {
        let invalid = |reason: String| RegistrationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'".into()));
        }
        if let Some(segment) = pattern
            .split('/')
            .find(|segment| segment.starts_with(':') || segment.starts_with('*'))
        {
            return Err(invalid(format!(
                "segment {segment:?} uses the old capture syntax, write {{name}} or {{*name}}"
            )));
        }
        self.patterns
            .insert(pattern, ())
            .map_err(|e| invalid(e.to_string()))
    }
}

impl Engine for AxumEngine {
    fn handle(
        &mut self,
        pattern: &str,
        method: Method,
        handler: RouteHandler,
    ) -> Result<(), RegistrationError> {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RegistrationError::UnsupportedMethod(method.to_string()))?;
        if self.registered.contains(&(pattern.to_string(), method.clone())) {
            return Err(RegistrationError::Duplicate {
                pattern: pattern.to_string(),
                method: method.to_string(),
            });
        }
        if !self.routes.contains_key(pattern) {
            self.check_pattern(pattern)?;
        }
        self.registered.insert((pattern.to_string(), method));

        let route = move |request: Request| {
            let handler = handler.clone();
            async move { handler(capture_path_params(request).await).await }
        };
        let methods = self.routes.remove(pattern).unwrap_or_default();
        self.routes.insert(
            pattern.to_string(),
            methods.on(filter, route.clone()).fallback(route),
        );
        Ok(())
    }
}

async fn capture_path_params(request: Request) -> Request {
    let (mut parts, body) = request.into_parts();
    if let Ok(raw) = RawPathParams::from_request_parts(&mut parts, &()).await {
        let params = raw
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        parts.extensions.insert(PathParams(params));
    }
    Request::from_parts(parts, body)
}

/// Check the registration rules and register one endpoint.
pub fn register_endpoint<E>(
    engine: &mut E,
    endpoint: &EndpointConfig,
    proxies: &ProxyFactory,
    handlers: &HandlerFactory,
) -> Result<(), RegistrationError>
where
    E: Engine + ?Sized,
{
    let name = endpoint.method.to_uppercase();
    let method = Method::from_bytes(name.as_bytes())
        .ok()
        .filter(|method| SUPPORTED_METHODS.contains(method))
        .ok_or_else(|| RegistrationError::UnsupportedMethod(name.clone()))?;

    if method != Method::GET && endpoint.backend.len() > 1 {
        return Err(RegistrationError::TooManyBackends {
            endpoint: endpoint.endpoint.clone(),
            method: name,
            backends: endpoint.backend.len(),
        });
    }

    let proxy = proxies.new_proxy(endpoint)?;
    let handler = handlers.build(endpoint, proxy);
    engine.handle(
        &endpoint.endpoint,
        method,
        route_handler(move |request| {
            let handler = handler.clone();
            async move { handler.handle(request).await }
        }),
    )
}

/// Register every endpoint, skipping the ones that break a rule.
///
/// Returns how many endpoints were registered.
pub fn register_endpoints<E>(
    engine: &mut E,
    endpoints: &[EndpointConfig],
    proxies: &ProxyFactory,
    handlers: &HandlerFactory,
) -> usize
where
    E: Engine + ?Sized,
{
    let mut registered = 0;
    for endpoint in endpoints {
        match register_endpoint(engine, endpoint, proxies, handlers) {
            Ok(()) => {
                tracing::debug!(
                    endpoint = %endpoint.endpoint,
                    method = %endpoint.method,
                    backends = endpoint.backend.len(),
                    "Registered endpoint"
                );
                registered += 1;
            }
            Err(e) => tracing::error!(
                endpoint = %endpoint.endpoint,
                method = %endpoint.method,
                error = %e,
                "Skipping endpoint"
            ),
        }
    }
    registered
}

/// Build the gateway router for a service.
pub fn new_router(
    config: &ServiceConfig,
    proxies: &ProxyFactory,
    handlers: &HandlerFactory,
) -> axum::Router {
    let mut engine = AxumEngine::new();

    if config.debug {
        for method in SUPPORTED_METHODS {
            let handler = route_handler(debug::debug_handler);
            if let Err(e) = engine.handle(DEBUG_PATTERN, method, handler) {
                tracing::error!(error = %e, "Debug endpoint not registered");
            }
        }
    }

    let registered = register_endpoints(&mut engine, &config.endpoints, proxies, handlers);
    tracing::info!(
        registered,
        configured = config.endpoints.len(),
        "Endpoints registered"
    );

    engine.into_router()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::proxy::{proxy_fn, BackendFactory, BoxProxy, Outcome, Response};
    use crate::render::RenderRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Backends that echo the shaped request.
    struct Echo;

    impl BackendFactory for Echo {
        fn new_backend(&self, backend: &BackendConfig) -> BoxProxy {
            let name = backend.url_pattern.clone();
            proxy_fn(move |_, req: crate::proxy::Request| {
                let mut data = serde_json::Map::new();
                data.insert(name.clone(), json!({"method": req.method, "path": req.path}));
                async move { Outcome::ok(Response::complete(data)) }
            })
        }
    }

    fn factories() -> (ProxyFactory, HandlerFactory) {
        let proxies = ProxyFactory::new(Arc::new(Echo), 1024);
        let handlers = HandlerFactory::new(
            RenderRegistry::new(),
            RequestBuilder::new(Arc::new(PathParamsExtractor), None),
            None,
        );
        (proxies, handlers)
    }

    fn endpoint(path: &str, method: &str, patterns: &[&str]) -> EndpointConfig {
        EndpointConfig {
            endpoint: path.into(),
            method: method.into(),
            timeout: Duration::from_secs(1),
            backend: patterns
                .iter()
                .map(|pattern| BackendConfig {
                    url_pattern: pattern.to_string(),
                    method: method.into(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    async fn send(router: &axum::Router, method: &str, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_header_values() {
        assert_eq!(gateway_header_value(None), "Version undefined");
        assert_eq!(gateway_header_value(Some("1.2")), "Version 1.2");
        assert_eq!(user_agent_value(None), "EdgeGateway Version undefined");
    }

    #[test]
    fn test_registration_rules() {
        let (proxies, handlers) = factories();
        let mut engine = AxumEngine::new();

        let ok = endpoint("/merged", "GET", &["/a", "/b"]);
        assert_eq!(register_endpoint(&mut engine, &ok, &proxies, &handlers), Ok(()));

        let lower = endpoint("/write", "post", &["/w"]);
        assert_eq!(register_endpoint(&mut engine, &lower, &proxies, &handlers), Ok(()));

        let fan_out_write = endpoint("/write", "PUT", &["/a", "/b"]);
        assert!(matches!(
            register_endpoint(&mut engine, &fan_out_write, &proxies, &handlers),
            Err(RegistrationError::TooManyBackends { backends: 2, .. })
        ));

        let options = endpoint("/opts", "OPTIONS", &["/o"]);
        assert_eq!(
            register_endpoint(&mut engine, &options, &proxies, &handlers),
            Err(RegistrationError::UnsupportedMethod("OPTIONS".into()))
        );

        let empty = endpoint("/empty", "GET", &[]);
        assert_eq!(
            register_endpoint(&mut engine, &empty, &proxies, &handlers),
            Err(RegistrationError::Factory(FactoryError::NoBackends("/empty".into())))
        );

        let again = endpoint("/merged", "GET", &["/a"]);
        assert!(matches!(
            register_endpoint(&mut engine, &again, &proxies, &handlers),
            Err(RegistrationError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_router_serves_registered_endpoints() {
        let (proxies, handlers) = factories();
        let config = ServiceConfig {
            endpoints: vec![
                endpoint("/users/{id}", "GET", &["/v1/users/{{.Id}}"]),
                endpoint("/users", "POST", &["/v1/users", "/v2/users"]),
                endpoint("/feed", "GET", &["/news", "/weather"]),
            ],
            ..Default::default()
        };
        let router = new_router(&config, &proxies, &handlers);

        let (status, body) = send(&router, "GET", "/users/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"{"/v1/users/{{.Id}}":{"method":"GET","path":"/v1/users/42"}}"#
        );

        let (status, body) = send(&router, "GET", "/feed").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["/news"]["path"], json!("/news"));
        assert_eq!(value["/weather"]["path"], json!("/weather"));

        // Skipped at registration: a write endpoint with two backends.
        let (status, _) = send(&router, "POST", "/users").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Debug endpoint is off by default.
        let (status, _) = send(&router, "GET", "/__debug/ping").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_verb_reaches_endpoint_handler() {
        let (proxies, handlers) = factories();
        let config = ServiceConfig {
            endpoints: vec![
                endpoint("/resource", "GET", &["/r"]),
                endpoint("/orders", "POST", &["/o"]),
            ],
            ..Default::default()
        };
        let router = new_router(&config, &proxies, &handlers);

        let wrong_verbs = [("PUT", "/resource"), ("DELETE", "/resource"), ("GET", "/orders")];
        for (method, uri) in wrong_verbs {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers()[GATEWAY_HEADER], "Version undefined");
            assert_eq!(response.headers()[COMPLETED_HEADER], HEADER_INCOMPLETE);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert!(body.is_empty());
        }
    }

    #[test]
    fn test_pattern_errors() {
        let (proxies, handlers) = factories();
        let mut engine = AxumEngine::new();

        let first = endpoint("/a/{id}", "GET", &["/a/{{.Id}}"]);
        assert_eq!(register_endpoint(&mut engine, &first, &proxies, &handlers), Ok(()));

        let renamed = endpoint("/a/{name}", "POST", &["/a"]);
        assert!(matches!(
            register_endpoint(&mut engine, &renamed, &proxies, &handlers),
            Err(RegistrationError::InvalidPattern { pattern, .. }) if pattern == "/a/{name}"
        ));

        for old_syntax in ["/users/:id", "/files/*path"] {
            let old = endpoint(old_syntax, "GET", &["/x"]);
            assert!(matches!(
                register_endpoint(&mut engine, &old, &proxies, &handlers),
                Err(RegistrationError::InvalidPattern { .. })
            ));
        }

        // A second method on an accepted pattern is not a conflict.
        let write = endpoint("/a/{id}", "PUT", &["/a"]);
        assert_eq!(register_endpoint(&mut engine, &write, &proxies, &handlers), Ok(()));
    }

    #[tokio::test]
    async fn test_invalid_patterns_are_skipped() {
        let (proxies, handlers) = factories();
        let config = ServiceConfig {
            endpoints: vec![
                endpoint("/a/{id}", "GET", &["/a/{{.Id}}"]),
                endpoint("/a/{name}", "POST", &["/a"]),
                endpoint("/users/:id", "GET", &["/u"]),
                endpoint("/b/{id}", "GET", &["/b/{{.Id}}"]),
            ],
            ..Default::default()
        };
        let mut engine = AxumEngine::new();
        assert_eq!(
            register_endpoints(&mut engine, &config.endpoints, &proxies, &handlers),
            2
        );

        let router = new_router(&config, &proxies, &handlers);
        let (status, body) = send(&router, "GET", "/a/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"/a/{{.Id}}":{"method":"GET","path":"/a/1"}}"#);

        let (status, _) = send(&router, "GET", "/b/2").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&router, "POST", "/a/1").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(&router, "GET", "/users/:id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_debug_endpoint() {
        let (proxies, handlers) = factories();
        let config = ServiceConfig {
            debug: true,
            ..Default::default()
        };
        let router = new_router(&config, &proxies, &handlers);

        for method in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
            let (status, body) = send(&router, method, "/__debug/some/path").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, r#"{"message":"pong"}"#);
        }
    }
}
