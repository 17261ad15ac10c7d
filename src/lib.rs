//! # tinyrest
//!
//! A tiny fluent REST server for mocking HTTP APIs.
//!
//! Routes are declared through a chained builder and served by an async
//! HTTP/1.1 listener. Handlers are plain async closures that return a
//! string, a [`Response`], or a JSON reply.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tinyrest::{ConsoleLogger, Response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tinyrest::server()
//!         .with_logger(ConsoleLogger)
//!         .with_http()
//!         .with_port(8001)
//!         .with_base_path("/ApiMocking")
//!         .on_get_path("/", |_req| async { "coucou" })
//!         .on_get_path("/status", |_req| async {
//!             Response::json(&serde_json::json!({ "Text": "coucou" }))
//!         })
//!         .create()?
//!         .listen()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod logger;
pub mod route;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, IntoReply, Method, Request, Response, StatusCode};
pub use logger::{ConsoleLogger, Logger};
pub use route::RouteTable;
pub use server::{ConfigError, Server, ServerBuilder, ServerError, ShutdownHandle, Transport};

/// Entry point of the fluent chain. Equivalent to [`ServerBuilder::new`].
pub fn server() -> ServerBuilder {
    ServerBuilder::new()
}
