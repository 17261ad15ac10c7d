//! Async TCP listener and dispatch loop.
//!
//! A [`Server`] is produced by [`ServerBuilder::create`] and does one thing:
//! [`listen`](Server::listen) binds the configured port and serves requests
//! through the frozen route table until shutdown. Each connection runs on its
//! own tokio task, so a slow handler never blocks the others. HTTP/1.1
//! persistent connections (keep-alive) are supported out of the box.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::http::{Request, RequestError, Response, StatusCode};
use crate::logger::Logger;
use crate::route::RouteTable;

mod builder;

pub use builder::{ConfigError, ServerBuilder, Transport};

/// Errors produced by the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request buffered before rejecting it (1 MiB).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A configured, immutable server.
///
/// The lifecycle is one-directional: builder → `create()` → `listen()`.
/// Once created, routes and configuration cannot change; the only further
/// events are serving requests and shutdown.
///
/// # Examples
///
/// ```rust,no_run
/// use tinyrest::ConsoleLogger;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     tinyrest::server()
///         .with_logger(ConsoleLogger)
///         .with_http()
///         .with_port(8001)
///         .on_get_path("/", |_req| async { "coucou" })
///         .create()?
///         .listen()
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    logger: Arc<dyn Logger>,
    transport: Transport,
    port: u16,
    base_path: String,
    routes: Arc<RouteTable>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("transport", &self.transport)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

/// Signals a listening [`Server`] to stop accepting connections.
///
/// Obtained from [`Server::shutdown_handle`] before the server is consumed
/// by `listen()`. Cloneable; any clone can trigger shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Unblocks `listen()`. In-flight requests finish on their own tasks.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl Server {
    pub(crate) fn configured(
        logger: Arc<dyn Logger>,
        transport: Transport,
        port: u16,
        base_path: String,
        routes: RouteTable,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            logger,
            transport,
            port,
            base_path,
            routes: Arc::new(routes),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the base path prefixed to every route.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns a handle that can unblock [`listen`](Self::listen) later.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Binds the configured port on all interfaces and serves until shutdown.
    ///
    /// Logs a startup line through the configured logger, then blocks the
    /// calling task in an accept loop. Every accepted connection is served on
    /// its own tokio task. Returns when a [`ShutdownHandle`] fires.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the port cannot be bound and
    /// [`ServerError::Io`] if the listener itself fails.
    pub async fn listen(self) -> Result<(), ServerError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind { addr, source: e })?;
        self.serve(listener).await
    }

    /// Serves on an externally bound listener instead of binding the
    /// configured port. Useful for ephemeral-port setups in tests.
    pub async fn listen_on(self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve(listener).await
    }

    async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let Self {
            logger,
            transport,
            base_path,
            routes,
            shutdown_rx,
            shutdown_tx: _shutdown_tx,
            ..
        } = self;

        logger.log(&format!(
            "listening on {}://{local_addr}{base_path}",
            transport.scheme()
        ));

        let mut shutdown = shutdown_rx;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let routes = Arc::clone(&routes);
                    let logger = Arc::clone(&logger);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, routes, logger).await {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    logger.log("shutdown requested, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    routes: Arc<RouteTable>,
    logger: Arc<dyn Logger>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received; read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let method = request.method().clone();
        let path = request.path().to_owned();

        let started = Instant::now();
        let mut response = routes.dispatch(request).await;
        if !keep_alive {
            response = response.keep_alive(false);
        }

        logger.log(&format!(
            "{method} {path} - {} ({:?})",
            response.status().as_u16(),
            started.elapsed()
        ));

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RecordingLogger;

    async fn send_request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        String::from_utf8(reply).unwrap()
    }

    #[tokio::test]
    async fn serves_requests_end_to_end() {
        let logger = Arc::new(RecordingLogger::new());
        let server = crate::server()
            .with_logger(Arc::clone(&logger))
            .with_http()
            .with_port(8001)
            .with_base_path("/ApiMocking")
            .on_get_path("/", |_req| async { "coucou 0" })
            .create()
            .unwrap();

        let handle = server.shutdown_handle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn(server.listen_on(listener));

        let reply = send_request(
            addr,
            "GET /ApiMocking/ HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("coucou 0"));

        let missing = send_request(
            addr,
            "GET /elsewhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));

        handle.shutdown();
        serving.await.unwrap().unwrap();

        let lines = logger.lines();
        assert!(lines[0].starts_with("listening on http://"));
        assert!(lines.iter().any(|l| l.starts_with("GET /ApiMocking/ - 200")));
        assert!(lines.iter().any(|l| l.starts_with("GET /elsewhere - 404")));
        assert_eq!(lines.last().unwrap(), "shutdown requested, stopping listener");
    }

    #[tokio::test]
    async fn keep_alive_serves_two_requests_on_one_connection() {
        let server = crate::server()
            .with_logger(RecordingLogger::new())
            .with_http()
            .with_port(8001)
            .on_get_path("/ping", |_req| async { "pong" })
            .create()
            .unwrap();

        let handle = server.shutdown_handle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn(server.listen_on(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        for _ in 0..2 {
            stream
                .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            let text = std::str::from_utf8(&chunk[..n]).unwrap();
            assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(text.contains("Connection: keep-alive\r\n"));
            assert!(text.ends_with("pong"));
        }
        drop(stream);

        handle.shutdown();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let server = crate::server()
            .with_logger(RecordingLogger::new())
            .with_http()
            .with_port(8001)
            .create()
            .unwrap();

        let handle = server.shutdown_handle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn(server.listen_on(listener));

        let reply = send_request(addr, "NOT AN HTTP REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        handle.shutdown();
        serving.await.unwrap().unwrap();
    }
}
