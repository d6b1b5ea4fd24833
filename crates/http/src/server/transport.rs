//! Transport decoration seam.
//!
//! TLS (or any other stream transformation) happens outside the engine: a
//! listener may carry a [`TransportDecorator`] that turns each accepted TCP
//! stream into an opaque byte stream before the codecs ever see data. The
//! handshake runs on the connection's own task, so a slow handshake never
//! stalls the accept loop.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Object-safe alias for a bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A decorated connection stream.
pub type BoxStream = Box<dyn AsyncStream>;

/// Wraps freshly accepted streams, e.g. with a TLS handshake.
///
/// Errors abort that single connection; the listener keeps accepting.
#[async_trait]
pub trait TransportDecorator: Send + Sync {
    async fn decorate(&self, stream: TcpStream) -> io::Result<BoxStream>;
}
