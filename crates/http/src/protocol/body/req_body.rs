//! Channel-backed request body streaming.
//!
//! The connection cannot hand the handler direct access to its read half,
//! because the same buffer carries the next pipelined request. The body is
//! streamed over a pair of endpoints instead:
//!
//! - [`ReqBody`] is the consumer facade given to the handler. It implements
//!   `http_body::Body` and requests chunks on demand.
//! - [`ReqBodySender`] stays with the connection, owns the borrow of the
//!   decoded payload stream, and answers those requests. After the handler
//!   returns it drains whatever the handler left unread, so the connection
//!   is positioned at the next preamble before any reuse decision.
//!
//! Each pair is bound to a single request cycle and discarded afterwards.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, Stream, StreamExt};

use http_body::{Body, Frame, SizeHint};
use tracing::{debug, error};

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

type ChunkRequest = oneshot::Sender<PayloadItem>;

/// Consumer side of a request body, handed to the handler.
pub struct ReqBody {
    signal: mpsc::Sender<ChunkRequest>,
    receiving: Option<oneshot::Receiver<PayloadItem>>,
    payload_size: PayloadSize,
}

impl ReqBody {
    /// Creates the consumer/producer pair for one request cycle.
    ///
    /// `payload_stream` is the connection's decoded message stream; the
    /// producer borrows it for the duration of the cycle.
    pub fn channel<S>(payload_stream: &mut S, payload_size: PayloadSize) -> (ReqBody, ReqBodySender<'_, S>)
    where
        S: Stream + Unpin,
    {
        let (signal, receiver) = mpsc::channel(16);

        let body = ReqBody { signal, receiving: None, payload_size };
        // even an empty body flows through the stream: the payload decoder
        // reports an immediate Eof, which is what flips `eof` here
        let sender = ReqBodySender { payload_stream, receiver, eof: false };

        (body, sender)
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        loop {
            if let Some(receiver) = &mut self.receiving {
                return match ready!(receiver.poll_unpin(cx)) {
                    Ok(PayloadItem::Chunk(bytes)) => {
                        self.receiving.take();
                        Poll::Ready(Some(Ok(Frame::data(bytes))))
                    }
                    Ok(PayloadItem::Eof) => {
                        self.receiving.take();
                        Poll::Ready(None)
                    }
                    Err(_) => {
                        self.receiving.take();
                        Poll::Ready(Some(Err(ParseError::invalid_body("body producer went away"))))
                    }
                };
            }

            match ready!(self.signal.poll_ready(cx)) {
                Ok(()) => {
                    let (tx, rx) = oneshot::channel();
                    match self.signal.start_send(tx) {
                        Ok(()) => {
                            self.receiving = Some(rx);
                        }
                        Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
                    }
                }
                Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
            }
        }
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}

/// Producer side of a request body, kept by the connection.
pub struct ReqBodySender<'conn, S>
where
    S: Stream + Unpin,
{
    payload_stream: &'conn mut S,
    receiver: mpsc::Receiver<ChunkRequest>,
    eof: bool,
}

impl<S> ReqBodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    /// Answers chunk requests until the body ends or the consumer goes away.
    ///
    /// Runs concurrently with the handler; a handler that never touches the
    /// body simply never requests a chunk and this future stays pending until
    /// the cycle ends.
    pub async fn send_body(&mut self) -> Result<(), ParseError> {
        loop {
            if self.eof {
                return Ok(());
            }

            match self.receiver.next().await {
                Some(request) => {
                    let item = self.next_item().await?;
                    if item.is_eof() {
                        self.eof = true;
                    }
                    // the consumer may have been dropped mid-request; the
                    // remainder is picked up by skip_body
                    let _ = request.send(item);
                }
                // handler finished without reading further
                None => return Ok(()),
            }
        }
    }

    /// Discards any unread remainder of the body, up to `max_drain_bytes`.
    ///
    /// Returns `true` when the body is fully consumed and the stream is
    /// positioned at the next preamble, the precondition for connection
    /// reuse. Exceeding the bound, or any decode failure, returns `false`.
    pub async fn skip_body(&mut self, max_drain_bytes: u64) -> bool {
        let mut skipped: u64 = 0;

        while !self.eof {
            match self.next_item().await {
                Ok(PayloadItem::Eof) => {
                    self.eof = true;
                    if skipped > 0 {
                        debug!(skipped, "discarded unread request body");
                    }
                }
                Ok(PayloadItem::Chunk(bytes)) => {
                    skipped += bytes.len() as u64;
                    if skipped > max_drain_bytes {
                        debug!(skipped, max_drain_bytes, "unread request body exceeds drain bound, giving up");
                        return false;
                    }
                }
                Err(e) => {
                    error!("failed draining request body: {e}");
                    return false;
                }
            }
        }

        true
    }

    async fn next_item(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => {
                error!("preamble decoded while streaming a request body");
                Err(ParseError::invalid_body("preamble in the middle of a body"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::invalid_body("stream ended before the body completed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn payload_stream(
        parts: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin {
        let mut items: Vec<Result<Message<(RequestHeader, PayloadSize)>, ParseError>> = parts
            .into_iter()
            .map(|part| Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(part)))))
            .collect();
        items.push(Ok(Message::Payload(PayloadItem::Eof)));
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn handler_reads_full_body() {
        let mut stream = payload_stream(vec![b"hello", b" ", b"world"]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Chunked);

        let (collected, _) = tokio::join!(body.collect(), sender.send_body());
        assert_eq!(collected.unwrap().to_bytes().as_ref(), b"hello world");

        assert!(sender.skip_body(u64::MAX).await);
    }

    #[tokio::test]
    async fn unread_body_is_drained_within_bound() {
        let mut stream = payload_stream(vec![b"0123456789"]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(10));

        drop(body);
        assert!(sender.skip_body(64).await);
    }

    #[tokio::test]
    async fn drain_bound_is_enforced() {
        let mut stream = payload_stream(vec![b"0123456789", b"0123456789"]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(20));

        drop(body);
        assert!(!sender.skip_body(5).await);
    }

    #[tokio::test]
    async fn empty_body_reports_clean_eof() {
        // a bodyless request still produces one Eof item from the decoder
        let mut stream = payload_stream(vec![]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Empty);

        let (collected, _) = tokio::join!(body.collect(), sender.send_body());
        assert!(collected.unwrap().to_bytes().is_empty());
        assert!(sender.skip_body(0).await);
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let mut stream = futures::stream::iter(vec![Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"partial"))))]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(100));

        let (collected, _) = tokio::join!(body.collect(), sender.send_body());
        assert!(collected.is_err());
    }
}
