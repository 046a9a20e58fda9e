//! Request-processing pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! EndpointHandler (deadline-bound Context, Request)
//!     → request_builder.rs (backend path + method)
//!     → concurrent.rs (hedged fan-out when concurrent_calls > 1)
//!     → http.rs (terminal outbound call)
//!     ← Outcome { response, error }
//!
//! GET endpoints with several backends:
//!     → merge.rs (one stack per backend, merged Data)
//! ```
//!
//! # Design Decisions
//! - A `Proxy` is a shared async capability behind `Arc<dyn Proxy>`
//! - A `Middleware` turns one proxy into another; a `Pipeline` folds an
//!   ordered list of middlewares over a terminal proxy, outermost first
//! - Every stage observes the `Context` and returns instead of blocking past it

pub mod concurrent;
pub mod context;
pub mod error;
pub mod factory;
pub mod http;
pub mod merge;
pub mod request_builder;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use futures_util::future::BoxFuture;

pub use concurrent::ConcurrentMiddleware;
pub use context::Context;
pub use error::ProxyError;
pub use factory::{BackendFactory, ProxyFactory};
pub use merge::MergeMiddleware;
pub use request_builder::RequestBuilderMiddleware;
pub use types::{Metadata, Outcome, Params, Request, Response, Values};

/// Default cap on a request body buffered for replay.
pub const DEFAULT_MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Future returned by a proxy call.
pub type ProxyFuture = BoxFuture<'static, Outcome>;

/// A pipeline stage: given a context and a request, produce an outcome.
pub trait Proxy: Send + Sync + 'static {
    fn call(&self, ctx: Context, request: Request) -> ProxyFuture;
}

/// Shared, type-erased proxy.
pub type BoxProxy = Arc<dyn Proxy>;

/// A transformation from one proxy to another.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxProxy) -> BoxProxy;
}

/// Ordered list of middlewares folded over a terminal proxy.
///
/// The first layer added is the outermost: it sees the caller's context and
/// request before any other stage.
#[derive(Default)]
pub struct Pipeline {
    layers: Vec<Box<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware inside the ones already added.
    pub fn layer<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(Box::new(middleware));
        self
    }

    /// Wrap `terminal` with every layer.
    pub fn service(&self, terminal: BoxProxy) -> BoxProxy {
        self.layers
            .iter()
            .rev()
            .fold(terminal, |next, layer| layer.wrap(next))
    }
}

/// Adapter turning an async closure into a proxy.
pub struct ProxyFn<F> {
    f: F,
}

impl<F, Fut> Proxy for ProxyFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, ctx: Context, request: Request) -> ProxyFuture {
        Box::pin((self.f)(ctx, request))
    }
}

/// Build a proxy from an async closure.
pub fn proxy_fn<F, Fut>(f: F) -> BoxProxy
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(ProxyFn { f })
}

/// A proxy that answers with neither response nor error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProxy;

impl Proxy for NoopProxy {
    fn call(&self, _ctx: Context, _request: Request) -> ProxyFuture {
        Box::pin(async { Outcome::empty() })
    }
}

/// Drain a request body into memory so it can be replayed, bounded by the context.
pub(crate) async fn buffer_body(
    ctx: &Context,
    body: Body,
    limit: usize,
) -> Result<Bytes, ProxyError> {
    ctx.run(axum::body::to_bytes(body, limit))
        .await?
        .map_err(|e| ProxyError::Body(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tag {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Tag {
        fn wrap(&self, next: BoxProxy) -> BoxProxy {
            let name = self.name;
            let seen = self.seen.clone();
            proxy_fn(move |ctx, req| {
                seen.lock().unwrap().push(name);
                next.call(ctx, req)
            })
        }
    }

    #[tokio::test]
    async fn test_pipeline_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let terminal_seen = seen.clone();
        let terminal = proxy_fn(move |_, _| {
            terminal_seen.lock().unwrap().push("terminal");
            async { Outcome::empty() }
        });

        let proxy = Pipeline::new()
            .layer(Tag { name: "outer", seen: seen.clone() })
            .layer(Tag { name: "inner", seen: seen.clone() })
            .service(terminal);

        proxy.call(Context::background(), Request::default()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner", "terminal"]);
    }

    #[tokio::test]
    async fn test_noop_proxy() {
        let outcome = NoopProxy.call(Context::background(), Request::default()).await;
        assert!(outcome.response.is_none());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_buffer_body_limit() {
        let ctx = Context::background();
        let ok = buffer_body(&ctx, Body::from("abc"), 16).await.unwrap();
        assert_eq!(&ok[..], b"abc");

        let err = buffer_body(&ctx, Body::from("too large"), 4).await.unwrap_err();
        assert!(matches!(err, ProxyError::Body(_)));
    }
}
