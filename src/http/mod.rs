//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → router (endpoint handler per pattern + method)
//!     → proxy pipeline → backends
//!     → render → Send to client
//! ```

pub mod server;

pub use server::HttpServer;
