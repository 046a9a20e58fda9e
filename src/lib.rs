//! Edge gateway library.
//!
//! Exposes gateway endpoints that fan out to backend services through a
//! composable proxy pipeline, then render the merged result.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod render;
pub mod router;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
