//! Byte-counting stream wrapper.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::ServerObserver;

pin_project! {
    /// Wraps a connection's byte stream and reports transferred byte counts
    /// to the observer. Sits below the codecs, so it sees exactly what went
    /// over the transport (after TLS decoration, before framing).
    pub(crate) struct ObservedStream<S> {
        #[pin]
        inner: S,
        observer: Arc<dyn ServerObserver>,
    }
}

impl<S> ObservedStream<S> {
    pub(crate) fn new(inner: S, observer: Arc<dyn ServerObserver>) -> Self {
        Self { inner, observer }
    }
}

impl<S> fmt::Debug for ObservedStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedStream").finish_non_exhaustive()
    }
}

impl<S: AsyncRead> AsyncRead for ObservedStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &result {
            let n = buf.filled().len() - before;
            if n > 0 {
                this.observer.bytes_read(n);
            }
        }
        result
    }
}

impl<S: AsyncWrite> AsyncWrite for ObservedStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        let result = this.inner.poll_write(cx, buf);

        if let Poll::Ready(Ok(n)) = &result {
            if *n > 0 {
                this.observer.bytes_written(*n);
            }
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::CountingObserver;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn read_and_write_counts_are_reported() {
        let observer = Arc::new(CountingObserver::strict());
        let (mut client, server) = tokio::io::duplex(256);
        let mut observed = ObservedStream::new(server, Arc::clone(&observer) as Arc<dyn ServerObserver>);

        client.write_all(b"ping!").await.unwrap();
        let mut buf = [0u8; 5];
        observed.read_exact(&mut buf).await.unwrap();

        observed.write_all(b"pong").await.unwrap();
        let mut out = [0u8; 4];
        client.read_exact(&mut out).await.unwrap();

        assert_eq!(observer.total_bytes_read(), 5);
        assert_eq!(observer.total_bytes_written(), 4);
    }
}
