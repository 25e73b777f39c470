//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function, with keep-alive, a cap on concurrently served connections, and
//! cooperative shutdown through a [`CancellationToken`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_CONNECTIONS;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
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

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use duetodo::server::Server;
/// use duetodo::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8000").await?.with_max_connections(64);
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_connections: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        })
    }

    /// Caps the number of connections served at once. Once the cap is
    /// reached, new connections wait in the listen backlog. Values below one
    /// are treated as one.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests with `handler` until the process ends.
    ///
    /// # Errors
    ///
    /// See [`run_until`](Self::run_until).
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, CancellationToken::new()).await
    }

    /// Serves requests with `handler` until `shutdown` is cancelled.
    ///
    /// Each connection runs on its own Tokio task. Cancelling `shutdown`
    /// stops accepting; connections already being served run to completion.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are logged and skipped.
    pub async fn run_until<H, F>(
        self,
        handler: H,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let limiter = Arc::new(Semaphore::new(self.max_connections));
        info!(
            address = %self.local_addr,
            max_connections = self.max_connections,
            "duetodo listening"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "connection limiter closed");
                        break;
                    }
                },
            };

            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
                drop(permit);
            });
        }

        info!(address = %self.local_addr, "server stopped accepting connections");
        Ok(())
    }
}

/// Writes a final error response and closes the exchange.
async fn reject(stream: &mut TcpStream, status: StatusCode, message: String) -> std::io::Result<()> {
    let response = Response::new(status).body(message).keep_alive(false);
    stream.write_all(&response.into_bytes()).await
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Pipelined requests may already be buffered; only read when the
        // buffer cannot yield a complete request.
        let parsed = if buf.is_empty() {
            Err(RequestError::Incomplete)
        } else {
            Request::parse(&buf)
        };

        let (request, body_offset) = match parsed {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > MAX_REQUEST_SIZE {
                    warn!(peer = %peer_addr, "request head too large, sending 413");
                    reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large".into()).await?;
                    break;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                reject(&mut stream, StatusCode::BadRequest, format!("Bad Request: {e}")).await?;
                break;
            }
        };

        let content_length = match request.content_length() {
            Ok(length) => length.unwrap_or(0),
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                reject(&mut stream, StatusCode::BadRequest, format!("Bad Request: {e}")).await?;
                break;
            }
        };

        let total_needed = match body_offset.checked_add(content_length) {
            Some(total) if total <= MAX_REQUEST_SIZE => total,
            _ => {
                warn!(peer = %peer_addr, content_length, "request too large, sending 413");
                reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large".into()).await?;
                break;
            }
        };

        // Wait for the full body.
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "connection closed mid-body");
                break;
            }
            continue;
        }

        let raw = buf.split_to(total_needed).freeze();
        let request = request.with_body(raw.slice(body_offset..));
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}
