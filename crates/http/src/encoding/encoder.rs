//! Content-coding encoders and the compressing body adapter.

use std::fmt::Debug;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use tracing::trace;
use zstd::stream::write::Encoder as ZstdEncoder;

use super::Writer;
use crate::protocol::SendError;

/// One of the supported content codings, wrapping its streaming compressor.
pub(crate) enum ContentEncoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl ContentEncoder {
    fn gzip() -> Self {
        Self::Gzip(GzEncoder::new(Writer::new(), Compression::default()))
    }

    fn deflate() -> Self {
        Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default()))
    }

    fn zstd() -> Option<Self> {
        ZstdEncoder::new(Writer::new(), 6).ok().map(Self::Zstd)
    }

    fn br() -> Self {
        Self::Br(Box::new(brotli::CompressorWriter::new(
            Writer::new(),
            32 * 1024, // buffer
            3,         // quality
            22,        // lg_window_size
        )))
    }

    /// Picks a coding both sides support, by server preference.
    pub(crate) fn select(accept_encoding: &str) -> Option<Self> {
        if accept_encoding.contains("zstd") {
            Self::zstd()
        } else if accept_encoding.contains("br") {
            Some(Self::br())
        } else if accept_encoding.contains("gzip") {
            Some(Self::gzip())
        } else if accept_encoding.contains("deflate") {
            Some(Self::deflate())
        } else {
            None
        }
    }

    /// The token for the `Content-Encoding` header.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Gzip(_) => "gzip",
            Self::Deflate(_) => "deflate",
            Self::Zstd(_) => "zstd",
            Self::Br(_) => "br",
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        };
        if let Err(ref e) = result {
            trace!(coding = self.name(), "compression write failed: {e}");
        }
        result
    }

    /// Drains the compressed bytes produced so far.
    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    /// Terminates the coded stream and returns the remaining bytes.
    fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Gzip(encoder) => Ok(encoder.finish()?.into_bytes()),
            Self::Deflate(encoder) => Ok(encoder.finish()?.into_bytes()),
            Self::Zstd(encoder) => Ok(encoder.finish()?.into_bytes()),
            Self::Br(mut encoder) => {
                encoder.flush()?;
                Ok(encoder.into_inner().into_bytes())
            }
        }
    }
}

impl Debug for ContentEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContentEncoder").field(&self.name()).finish()
    }
}

pin_project! {
    /// Pipes an inner body's data frames through a [`ContentEncoder`].
    ///
    /// The final compressed block is emitted when the inner body ends; after
    /// that the stream reports end-of-stream.
    pub(crate) struct EncodedBody<B> {
        #[pin]
        inner: B,
        encoder: Option<ContentEncoder>,
    }
}

impl<B> EncodedBody<B> {
    pub(crate) fn new(inner: B, encoder: ContentEncoder) -> Self {
        Self { inner, encoder: Some(encoder) }
    }
}

impl<B> Body for EncodedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: ToString,
{
    type Data = Bytes;
    type Error = SendError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            // encoder is taken exactly once, when the inner body ends
            let Some(encoder) = this.encoder.as_mut() else {
                return Poll::Ready(None);
            };

            return match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        return Poll::Ready(Some(Err(SendError::invalid_body("trailers are not supported"))));
                    };

                    if let Err(e) = encoder.write(&data) {
                        return Poll::Ready(Some(Err(SendError::io(e))));
                    }

                    let bytes = encoder.take();
                    if bytes.is_empty() {
                        // compressor is buffering, poll the inner body again
                        continue;
                    }
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }

                Some(Err(e)) => Poll::Ready(Some(Err(SendError::invalid_body(e.to_string())))),

                None => match this.encoder.take() {
                    Some(encoder) => match encoder.finish() {
                        Ok(bytes) if bytes.is_empty() => Poll::Ready(None),
                        Ok(bytes) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                        Err(e) => Poll::Ready(Some(Err(SendError::io(e)))),
                    },
                    None => Poll::Ready(None),
                },
            };
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none()
    }
}
