//! Async TCP server using Tokio.
//!
//! Accepts TCP connections, frames HTTP/1.1 requests off each one and hands them to a
//! [`Dispatcher`]. Connections are persistent by default and pipelined requests are
//! answered in arrival order.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Dispatcher;

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
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
pub const INITIAL_BUF_SIZE: usize = 4096;

/// A bound listener that serves JSON routes.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use getjson::controllers::ApiController;
/// use getjson::router::{Dispatcher, Registry};
/// use getjson::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = Registry::builder().controller::<ApiController>().build()?;
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(Arc::new(Dispatcher::new(registry))).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// Port `0` picks a free port; read it back with [`local_addr`](Self::local_addr).
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
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests through `dispatcher` until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), ServerError> {
        self.serve_with_shutdown(dispatcher, std::future::pending())
            .await
    }

    /// Serves requests through `dispatcher` until `signal` resolves.
    ///
    /// Stops accepting new connections once the signal fires. Connections already
    /// accepted keep running on their own tasks until the peer closes them.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve_with_shutdown<S>(
        self,
        dispatcher: Arc<Dispatcher>,
        signal: S,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        info!(
            address = %self.local_addr,
            routes = dispatcher.registry().len(),
            "getjson listening"
        );
        tokio::pin!(signal);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut signal => {
                    info!(address = %self.local_addr, "shutdown signal received");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = Arc::clone(&dispatcher);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, dispatcher).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// What to do with the bytes currently buffered for a connection.
enum Framing {
    /// A whole request is buffered; it spans `len` bytes.
    Ready(Request, usize),
    /// More bytes are needed.
    Partial,
    /// Send this response and close.
    Reject(Response),
}

fn frame(buf: &[u8]) -> Framing {
    match Request::parse(buf) {
        Ok((request, body_offset)) => {
            let total = body_offset.saturating_add(request.content_length().unwrap_or(0));
            if total > MAX_REQUEST_SIZE {
                Framing::Reject(Response::new(StatusCode::PayloadTooLarge))
            } else if buf.len() < total {
                Framing::Partial
            } else {
                Framing::Ready(request, total)
            }
        }
        Err(RequestError::Incomplete) if buf.len() > MAX_REQUEST_SIZE => {
            Framing::Reject(Response::new(StatusCode::PayloadTooLarge))
        }
        Err(RequestError::Incomplete) => Framing::Partial,
        Err(e) => {
            debug!(error = %e, "unparsable request");
            Framing::Reject(Response::new(StatusCode::BadRequest))
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// Every complete request already buffered is answered before the next read, so
/// pipelined requests never wait on the socket.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        while !buf.is_empty() {
            let (request, len) = match frame(&buf) {
                Framing::Ready(request, len) => (request, len),
                Framing::Partial => break,
                Framing::Reject(response) => {
                    warn!(peer = %peer_addr, status = response.status().as_u16(), "request rejected");
                    stream
                        .write_all(&response.keep_alive(false).into_bytes())
                        .await?;
                    return Ok(());
                }
            };

            let keep_alive = request.is_keep_alive();
            let response = dispatcher.dispatch(&request);

            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                status = response.status().as_u16(),
                "request served"
            );

            stream
                .write_all(&response.keep_alive(keep_alive).into_bytes())
                .await?;
            stream.flush().await?;
            buf.advance(len);

            if !keep_alive {
                debug!(peer = %peer_addr, "closing connection on request");
                return Ok(());
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_len(raw: &[u8]) -> Option<usize> {
        match frame(raw) {
            Framing::Ready(_, len) => Some(len),
            _ => None,
        }
    }

    #[test]
    fn complete_request_is_framed() {
        let raw = b"POST /api/odd HTTP/1.1\r\nContent-Length: 3\r\n\r\n[1]";
        assert_eq!(ready_len(raw), Some(raw.len()));
    }

    #[test]
    fn pipelined_request_framed_one_at_a_time() {
        let first = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\n[]".as_slice();
        let raw = [first, b"GET /b HTTP/1.1\r\n\r\n"].concat();
        assert_eq!(ready_len(&raw), Some(first.len()));
    }

    #[test]
    fn short_body_waits_for_more() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\n[1,";
        assert!(matches!(frame(raw), Framing::Partial));
        assert!(matches!(frame(b"GET / HTTP/1.1\r\nHost"), Framing::Partial));
    }

    #[test]
    fn oversized_declared_body_rejected() {
        let raw = format!(
            "POST /a HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_REQUEST_SIZE + 1
        );
        match frame(raw.as_bytes()) {
            Framing::Reject(response) => {
                assert_eq!(response.status(), StatusCode::PayloadTooLarge)
            }
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn garbage_is_bad_request() {
        match frame(b"\x01\x02 nonsense\r\n\r\n") {
            Framing::Reject(response) => assert_eq!(response.status(), StatusCode::BadRequest),
            _ => panic!("expected rejection"),
        }
    }
}
