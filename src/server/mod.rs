//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Connections are kept alive until the peer closes them or asks for
//! `Connection: close`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::context::Context;
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

/// Largest request (head + body) we buffer before answering `413` (1 MiB).
///
/// Chat messages are short; anything bigger is not a chat message.
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The relay's HTTP/1.1 server.
///
/// # Examples
///
/// ```rust,no_run
/// use relaychat::{Response, Router, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.post("/api/chat", |_ctx| async { Response::new(StatusCode::Ok) });
///     let service = router.into_service();
///
///     let server = Server::bind("127.0.0.1:3001").await?;
///     server
///         .run_until(move |ctx| service.call(ctx), async {
///             let _ = tokio::signal::ctrl_c().await;
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to `addr`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the address cannot be bound.
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

    /// Address the server is bound to. Useful after binding port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Each connection runs in its own Tokio task and shares `handler`
    /// through an [`Arc`]. Connections already in progress are left to finish
    /// on their own once the accept loop stops.
    ///
    /// # Errors
    ///
    /// Currently never fails after a successful bind; accept errors are
    /// logged and the loop continues.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "relay listening");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(%peer, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, handler).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Serves requests on one connection until it closes.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!(%peer, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(%peer, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // Several pipelined requests may already sit in the buffer.
        loop {
            let frame_len = match complete_frame(&buf) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(e) => {
                    let status = match e {
                        RequestError::TooLarge => StatusCode::PayloadTooLarge,
                        _ => StatusCode::BadRequest,
                    };
                    warn!(%peer, error = %e, status = status.as_u16(), "rejecting request");
                    let response = Response::new(status)
                        .body(format!("{}: {e}", status.canonical_reason()))
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    return Ok(());
                }
            };

            let frame = buf.split_to(frame_len);
            let (request, _) = match Request::parse(&frame) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(%peer, error = %e, "request changed between framing and parsing");
                    return Ok(());
                }
            };
            let keep_alive = request.is_keep_alive();

            debug!(%peer, method = %request.method(), path = %request.path(), "dispatching request");
            let response = handler(Context::new(request, peer)).await;
            stream
                .write_all(&response.keep_alive(keep_alive).into_bytes())
                .await?;
            stream.flush().await?;

            if !keep_alive {
                debug!(%peer, "Connection: close, shutting down");
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Length of the first complete request in `buf`, or `None` if more bytes
/// are needed.
///
/// A declared body that would push the request past [`MAX_REQUEST_SIZE`] is
/// rejected from the head alone.
fn complete_frame(buf: &[u8]) -> Result<Option<usize>, RequestError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let (request, body_offset) = match Request::parse(buf) {
        Ok(parsed) => parsed,
        Err(RequestError::Incomplete) => return Ok(None),
        Err(e) => return Err(e),
    };
    let total = request
        .content_length()?
        .unwrap_or(0)
        .checked_add(body_offset)
        .filter(|&total| total <= MAX_REQUEST_SIZE)
        .ok_or(RequestError::TooLarge)?;
    Ok((buf.len() >= total).then_some(total))
}
