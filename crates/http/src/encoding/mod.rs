//! Response body compression.
//!
//! Compression is a framing concern here: a compressed body loses its known
//! length, so the decision must land before the response head is committed.
//! [`negotiate`] makes that decision once per response (policy flag, client
//! `Accept-Encoding`, status class, body size) and rewrites the headers to
//! match. The returned body either passes frames through untouched or pipes
//! them through the selected [`encoder::ContentEncoder`].

mod encoder;

pub(crate) use encoder::EncodedBody;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderValue, Response, StatusCode, header};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::protocol::SendError;
use encoder::ContentEncoder;

/// Applies the response-compression policy, exactly once per response.
///
/// Returns the response with its body wrapped either way, so callers keep a
/// single concrete type. When compression applies the `Content-Length`
/// header is dropped (the compressed size is unknown, the body will be
/// chunked) and `Content-Encoding` names the chosen coding.
pub(crate) fn negotiate<B>(
    enabled: bool,
    accept_encoding: Option<&HeaderValue>,
    mut response: Response<B>,
    min_compress_bytes: u64,
) -> Response<MaybeEncoded<B>>
where
    B: Body<Data = Bytes>,
{
    let eligible = enabled
        && permits_body(response.status())
        && !response.headers().contains_key(header::CONTENT_ENCODING)
        && !matches!(response.body().size_hint().exact(), Some(0))
        && !matches!(response.body().size_hint().upper(), Some(upper) if upper <= min_compress_bytes);

    let encoder = if eligible {
        accept_encoding.and_then(|value| value.to_str().ok()).and_then(ContentEncoder::select)
    } else {
        None
    };

    match encoder {
        Some(encoder) => {
            response.headers_mut().remove(header::CONTENT_LENGTH);
            response.headers_mut().append(header::CONTENT_ENCODING, HeaderValue::from_static(encoder.name()));
            response.map(|body| MaybeEncoded::encoded(body, encoder))
        }
        None => response.map(MaybeEncoded::identity),
    }
}

/// Statuses whose responses carry no payload are never compressed.
fn permits_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

pin_project! {
    /// A response body that is either passed through or compressed.
    #[project = MaybeEncodedProj]
    pub enum MaybeEncoded<B> {
        Identity { #[pin] inner: B },
        Encoded { #[pin] inner: EncodedBody<B> },
    }
}

impl<B> MaybeEncoded<B> {
    pub(crate) fn identity(inner: B) -> Self {
        Self::Identity { inner }
    }

    fn encoded(inner: B, encoder: ContentEncoder) -> Self {
        Self::Encoded { inner: EncodedBody::new(inner, encoder) }
    }
}

impl<B> Body for MaybeEncoded<B>
where
    B: Body<Data = Bytes>,
    B::Error: ToString,
{
    type Data = Bytes;
    type Error = SendError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            MaybeEncodedProj::Identity { inner } => inner
                .poll_frame(cx)
                .map(|next| next.map(|result| result.map_err(|e| SendError::invalid_body(e.to_string())))),
            MaybeEncodedProj::Encoded { inner } => inner.poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Identity { inner } => inner.is_end_stream(),
            Self::Encoded { inner } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Identity { inner } => inner.size_hint(),
            // compressed output size is unknowable up front
            Self::Encoded { .. } => SizeHint::new(),
        }
    }
}

/// `io::Write` sink that the compressors drain into.
#[derive(Debug, Default)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Takes the bytes produced so far.
    pub(crate) fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
