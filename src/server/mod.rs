//! The origin's accept loop.
//!
//! Each accepted socket gets its own task and tracing span. A connection
//! serves requests one at a time until the peer hangs up or either side asks
//! for `Connection: close`.

use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Largest request, head plus body, a connection will buffer (1 MiB).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// An HTTP/1.1 listener.
///
/// ```rust,no_run
/// use cachelens::server::Server;
/// use cachelens::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:0").await?;
///     println!("listening on {}", server.local_addr());
///     server.run(|_req| async { Response::new(StatusCode::Ok) }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds `addr`. Port `0` lets the OS pick.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] naming the address when binding fails.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves forever.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, future::pending()).await
    }

    /// Serves until `shutdown` resolves.
    ///
    /// Only the accept loop stops; connections already accepted finish on
    /// their own tasks.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "origin listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        continue;
                    }
                },
                () = &mut shutdown => break,
            };

            let handler = Arc::clone(&handler);
            let span = info_span!("connection", %peer);
            tokio::spawn(
                async move {
                    let mut conn = Connection::new(stream);
                    if let Err(e) = conn.serve(&*handler).await {
                        warn!(error = %e, "connection dropped");
                    }
                }
                .instrument(span),
            );
        }

        info!(address = %self.local_addr, "origin stopped accepting");
        Ok(())
    }
}

/// Why a connection stopped reading requests.
enum Framing {
    /// A full request was split off the buffer.
    Ready(Request),
    /// The peer closed cleanly between requests.
    Closed,
    /// The bytes on the wire cannot become a request; answer with this and hang up.
    Reject(Response),
}

struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    async fn serve<H, F>(&mut self, handler: &H) -> io::Result<()>
    where
        H: Fn(Request) -> F,
        F: Future<Output = Response>,
    {
        loop {
            let request = match self.next_request().await? {
                Framing::Ready(request) => request,
                Framing::Closed => return Ok(()),
                Framing::Reject(response) => return self.send(response).await,
            };

            let keep_alive = request.is_keep_alive();
            debug!(method = %request.method(), target = %request.target(), "request");

            let response = handler(request).await.keep_alive(keep_alive);
            self.send(response).await?;
            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Reads until one whole request is buffered, then splits exactly its
    /// bytes off so anything pipelined behind it stays for the next call.
    async fn next_request(&mut self) -> io::Result<Framing> {
        loop {
            if let Some(framing) = self.frame() {
                return Ok(framing);
            }
            if self.buf.len() > MAX_REQUEST_SIZE {
                return Ok(Framing::Reject(
                    Response::new(StatusCode::PayloadTooLarge).keep_alive(false),
                ));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                if !self.buf.is_empty() {
                    debug!(pending = self.buf.len(), "peer closed mid-request");
                }
                return Ok(Framing::Closed);
            }
        }
    }

    fn frame(&mut self) -> Option<Framing> {
        if self.buf.is_empty() {
            return None;
        }
        let needed = match Request::parse(&self.buf) {
            Ok((head, body_offset)) => body_offset + head.content_length().unwrap_or(0),
            Err(RequestError::Incomplete) => return None,
            Err(e) => return Some(bad_request(&e)),
        };
        if self.buf.len() < needed {
            return None;
        }
        let bytes = self.buf.split_to(needed);
        Some(match Request::parse(&bytes) {
            Ok((request, _)) => Framing::Ready(request),
            Err(e) => bad_request(&e),
        })
    }

    async fn send(&mut self, response: Response) -> io::Result<()> {
        self.stream.write_all(&response.into_bytes()).await?;
        self.stream.flush().await
    }
}

fn bad_request(e: &RequestError) -> Framing {
    warn!(error = %e, "unparseable request");
    Framing::Reject(
        Response::new(StatusCode::BadRequest)
            .body(format!("Bad Request: {e}"))
            .keep_alive(false),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    async fn raw_exchange(addr: SocketAddr, wire: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(wire).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[tokio::test]
    async fn answers_and_closes_on_request() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(
            |req: Request| async move { Response::new(StatusCode::Ok).body(req.path().to_owned()) },
            async {
                let _ = stopped.await;
            },
        ));

        let text = raw_exchange(
            addr,
            b"GET /api/cars HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("/api/cars"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|req: Request| async move {
            Response::new(StatusCode::Ok).body(req.path().to_owned())
        }));

        let text = raw_exchange(
            addr,
            b"GET /one HTTP/1.1\r\nHost: t\r\n\r\nGET /two HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n",
        )
        .await;
        let one = text.find("/one").unwrap();
        let two = text.find("/two").unwrap();
        assert!(one < two);
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[tokio::test]
    async fn garbage_gets_a_400() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|_req: Request| async { Response::new(StatusCode::Ok) }));

        let text = raw_exchange(addr, b"\x01\x02 nonsense\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{text}");
    }

    #[tokio::test]
    async fn bind_failure_reports_address() {
        let first = Server::bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().to_string();
        let err = Server::bind(&taken).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&taken));
    }
}
