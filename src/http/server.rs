//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with every registered endpoint
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::proxy::ProxyFactory;
use crate::render::RenderRegistry;
use crate::router::{new_router, HandlerFactory, PathParamsExtractor, RequestBuilder};

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a server whose endpoints call their backends over HTTP.
    pub fn new(config: ServiceConfig) -> Self {
        let proxies = ProxyFactory::http(config.max_buffered_body);
        Self::with_parts(config, proxies, RenderRegistry::new())
    }

    /// Create a server from explicit pipeline and render factories.
    pub fn with_parts(
        config: ServiceConfig,
        proxies: ProxyFactory,
        renders: RenderRegistry,
    ) -> Self {
        let version = config.version.as_deref();
        let handlers = HandlerFactory::new(
            renders,
            RequestBuilder::new(std::sync::Arc::new(PathParamsExtractor), version),
            version,
        );
        let router = Self::build_router(new_router(&config, &proxies, &handlers));
        Self { router, config }
    }

    /// Wrap the endpoint router with the shared middleware layers.
    fn build_router(endpoints: Router) -> Router {
        endpoints
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The application router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            service = %self.config.name,
            endpoints = self.config.endpoints.len(),
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
