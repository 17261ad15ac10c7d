//! Fluent server construction.
//!
//! A [`ServerBuilder`] accumulates configuration through chained calls and is
//! frozen into a [`Server`] by [`create`](ServerBuilder::create). Invalid
//! input (a pattern without a leading `/`, port 0) is recorded when the
//! offending call happens and surfaced at `create()`; the chain itself never
//! panics or short-circuits.

use std::sync::Arc;

use thiserror::Error;

use super::Server;
use crate::http::Method;
use crate::logger::Logger;
use crate::route::{Handler, IntoHandler, RouteTable, compose_path};

/// Wire transport the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain HTTP/1.1 over TCP.
    Http,
}

impl Transport {
    /// URL scheme for this transport.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Http => "http",
        }
    }
}

/// Configuration errors surfaced by [`ServerBuilder::create`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no logger configured; call with_logger(..) before create()")]
    MissingLogger,

    #[error("no transport configured; call with_http() before create()")]
    MissingTransport,

    #[error("no port configured; call with_port(..) before create()")]
    MissingPort,

    #[error("port {port} is out of range (1-65535)")]
    InvalidPort { port: u16 },

    #[error("route pattern {pattern:?} must begin with '/'")]
    InvalidPattern { pattern: String },

    #[error("base path {path:?} must begin with '/'")]
    InvalidBasePath { path: String },
}

/// Fluent builder for a [`Server`].
///
/// Obtained from [`crate::server()`]. Configuration calls may appear in any
/// order: the base path is applied to registered routes at `create()` time,
/// so `with_base_path` after `on_get_path` still prefixes that route.
///
/// # Examples
///
/// ```
/// use tinyrest::ConsoleLogger;
///
/// let server = tinyrest::server()
///     .with_logger(ConsoleLogger)
///     .with_http()
///     .with_port(8001)
///     .with_base_path("/ApiMocking")
///     .on_get_path("/", |_req| async { "coucou" })
///     .create()
///     .unwrap();
/// assert_eq!(server.port(), 8001);
/// ```
pub struct ServerBuilder {
    logger: Option<Arc<dyn Logger>>,
    transport: Option<Transport>,
    port: Option<u16>,
    base_path: String,
    routes: Vec<(Method, String, Handler)>,
    // First invalid configuration call, reported by create().
    error: Option<ConfigError>,
}

impl ServerBuilder {
    /// Creates a builder with nothing configured.
    pub fn new() -> Self {
        Self {
            logger: None,
            transport: None,
            port: None,
            base_path: String::new(),
            routes: Vec::new(),
            error: None,
        }
    }

    /// Sets the logger the server reports startup and requests through.
    #[must_use]
    pub fn with_logger(mut self, logger: impl Logger) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Selects plain HTTP as the transport. Shorthand for
    /// [`with_transport(Transport::Http)`](Self::with_transport).
    #[must_use]
    pub fn with_http(self) -> Self {
        self.with_transport(Transport::Http)
    }

    /// Selects the wire transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the TCP port to bind. Port 0 is rejected at `create()`.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        if port == 0 {
            self.record_error(ConfigError::InvalidPort { port });
        } else {
            self.port = Some(port);
        }
        self
    }

    /// Sets a path prefix applied to every registered route.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !path.is_empty() && !path.starts_with('/') {
            self.record_error(ConfigError::InvalidBasePath { path });
        } else {
            self.base_path = path;
        }
        self
    }

    /// Registers `handler` for GET requests at `base_path + pattern`.
    #[must_use]
    pub fn on_get_path(self, pattern: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Get, pattern, handler)
    }

    /// Registers `handler` for POST requests at `base_path + pattern`.
    #[must_use]
    pub fn on_post_path(self, pattern: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Post, pattern, handler)
    }

    /// Registers `handler` for PUT requests at `base_path + pattern`.
    #[must_use]
    pub fn on_put_path(self, pattern: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Put, pattern, handler)
    }

    /// Registers `handler` for DELETE requests at `base_path + pattern`.
    #[must_use]
    pub fn on_delete_path(self, pattern: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Delete, pattern, handler)
    }

    fn route(mut self, method: Method, pattern: &str, handler: impl IntoHandler) -> Self {
        if !pattern.starts_with('/') {
            self.record_error(ConfigError::InvalidPattern {
                pattern: pattern.to_owned(),
            });
            return self;
        }
        let handler: Handler = Arc::new(move |request| handler.call(request));
        self.routes.push((method, pattern.to_owned(), handler));
        self
    }

    fn record_error(&mut self, error: ConfigError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validates the configuration and freezes it into a [`Server`].
    ///
    /// # Errors
    ///
    /// Returns the first recorded [`ConfigError`], or the missing-option
    /// variant for whichever required setting (logger, transport, port) was
    /// never supplied.
    pub fn create(self) -> Result<Server, ConfigError> {
        let Self {
            logger,
            transport,
            port,
            base_path,
            routes,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }
        let logger = logger.ok_or(ConfigError::MissingLogger)?;
        let transport = transport.ok_or(ConfigError::MissingTransport)?;
        let port = port.ok_or(ConfigError::MissingPort)?;

        let mut table = RouteTable::new();
        for (method, pattern, handler) in routes {
            table.add_erased(method, &compose_path(&base_path, &pattern), handler);
        }

        Ok(Server::configured(logger, transport, port, base_path, table))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
