use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use http::header::{ACCEPT_ENCODING, CONNECTION};
use http::{HeaderValue, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::select;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::encoding;
use crate::handler::Handler;
use crate::observer::{NoopObserver, ServerObserver};
use crate::protocol::body::ReqBody;
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError,
    has_connection_token,
};
use crate::server::ServerConfig;

/// Concrete item type written through the framed sink. `ResponseEncoder`
/// accepts any `Buf` payload, so flushes need this pinned down.
type WireMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// The per-connection state machine.
///
/// One `HttpConnection` exclusively owns one accepted stream for its whole
/// lifetime and runs request cycles on it strictly in sequence: parse a
/// preamble, dispatch the handler, stream the response, decide reuse. Bytes
/// over-read while parsing (the start of a pipelined request or its body)
/// stay in the read buffer and are replayed in the next phase, never dropped.
///
/// The connection closes on: peer disconnect, phase timeout, malformed
/// input, a keep-alive-ineligible exchange, a post-commit failure, or the
/// shutdown token firing at a request boundary.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<BufWriter<W>, ResponseEncoder>,
    config: ServerConfig,
    observer: Arc<dyn ServerObserver>,
    shutdown: CancellationToken,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ServerConfig) -> Self {
        let framed_read =
            FramedRead::with_capacity(reader, RequestDecoder::new(config.max_header_bytes), config.read_buffer_size);
        let framed_write =
            FramedWrite::new(BufWriter::with_capacity(config.write_buffer_size, writer), ResponseEncoder::new());

        Self { framed_read, framed_write, config, observer: Arc::new(NoopObserver), shutdown: CancellationToken::new() }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ServerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Runs request cycles until the connection ends.
    ///
    /// Returns `Ok` for every orderly end (peer close, timeout, keep-alive
    /// ineligibility, shutdown) and `Err` when the connection had to be
    /// abandoned mid-protocol.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        <H::RespBody as Body>::Error: Display,
    {
        let mut first_request = true;

        loop {
            // the only blocking boundary between requests: a fresh connection
            // waits under the initial-read timeout, a reused one under the
            // keep-alive idle timeout, and shutdown cancels either wait
            let wait = if first_request { self.config.read_timeout } else { self.config.keep_alive_timeout };

            let awaited = select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                next = timeout(wait, self.framed_read.next()) => Some(next),
            };

            let Some(next) = awaited else {
                debug!("shutdown signalled, closing connection at request boundary");
                return self.finish().await;
            };

            let (header, payload_size) = match next {
                // expected traffic shaping, not an error worth telling the peer
                Err(_elapsed) => {
                    debug!(initial = first_request, "phase timeout while awaiting a request, closing");
                    return self.finish().await;
                }

                Ok(None) => {
                    trace!("peer closed the connection");
                    return self.finish().await;
                }

                Ok(Some(Err(e))) => {
                    warn!("malformed request: {e}");
                    self.observer.bad_request();
                    // nothing of this cycle's response has been sent yet
                    let _ = self.send_synthetic_response(StatusCode::BAD_REQUEST).await;
                    let _ = self.finish().await;
                    return Err(e.into());
                }

                Ok(Some(Ok(Message::Payload(_)))) => {
                    error!("payload message while awaiting a request preamble");
                    self.observer.bad_request();
                    let _ = self.send_synthetic_response(StatusCode::BAD_REQUEST).await;
                    let _ = self.finish().await;
                    return Err(ParseError::invalid_body("payload while awaiting a preamble").into());
                }

                Ok(Some(Ok(Message::Header(parts)))) => parts,
            };

            first_request = false;

            if !self.run_cycle(header, payload_size, &handler).await? {
                return self.finish().await;
            }
        }
    }

    /// Runs one request/response cycle. Returns whether the connection is
    /// eligible for another.
    async fn run_cycle<H>(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        handler: &Arc<H>,
    ) -> Result<bool, HttpError>
    where
        H: Handler,
        <H::RespBody as Body>::Error: Display,
    {
        trace!(method = %header.method(), target = %header.uri(), "dispatching request");

        if header.expects_continue() {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            debug!("sent interim continue response");
        }

        let client_keep_alive = header.keep_alive();
        let accept_encoding = header.headers().get(ACCEPT_ENCODING).cloned();

        let (req_body, mut body_sender) = ReqBody::channel(&mut self.framed_read, payload_size);
        let request = header.body(req_body);

        // drive the handler and the body pump together: the pump must be able
        // to answer chunk requests while the handler is running, and a
        // handler that never reads the body must not deadlock either side
        let handler_result = {
            tokio::pin! {
                let handler_future = handler.call(request);
                let pump_future = body_sender.send_body();
            }

            let mut pump_done = false;
            loop {
                select! {
                    biased;
                    response = &mut handler_future => break response,
                    pumped = &mut pump_future, if !pump_done => {
                        pump_done = true;
                        if let Err(e) = pumped {
                            debug!("request body pump stopped: {e}");
                        }
                    }
                }
            }
        };

        // whatever the handler left unread is discarded before any reuse
        let drained = body_sender.skip_body(self.config.max_drain_bytes).await;

        match handler_result {
            Ok(response) => {
                let response = encoding::negotiate(
                    self.config.compress,
                    accept_encoding.as_ref(),
                    response,
                    self.config.min_compress_bytes,
                );

                let server_close = has_connection_token(response.headers(), "close");
                let reuse = drained && client_keep_alive && !server_close;

                self.send_response(response, !reuse).await?;
                Ok(reuse)
            }

            // failed before anything was committed: a clean synthetic
            // response is still possible, but the connection is done
            Err(e) => {
                error!("handler failed: {}", e.into());
                self.send_synthetic_response(StatusCode::INTERNAL_SERVER_ERROR).await?;
                Ok(false)
            }
        }
    }

    /// Commits and streams one response.
    ///
    /// The first `feed` is the commit point: the framing is resolved from the
    /// body's size hint, the preamble is serialized, and no header can change
    /// afterwards. A body failure past that point poisons the connection;
    /// the error propagates without any attempt at a second status line.
    async fn send_response<T>(&mut self, mut response: Response<T>, close: bool) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes> + Unpin,
        T::Error: Display,
    {
        if close && !has_connection_token(response.headers(), "close") {
            response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let (parts, mut body) = response.into_parts();
        let payload_size = PayloadSize::from(body.size_hint());

        let head = Message::<_, Bytes>::Header((ResponseHead::from_parts(parts, ()), payload_size));
        self.framed_write.feed(head).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        // send (not feed) so large bodies stream instead of
                        // accumulating in the write buffer
                        self.framed_write.send(Message::Payload(PayloadItem::Chunk(data))).await?;
                    }
                    Err(_frame) => {
                        return Err(SendError::invalid_body("trailers are not supported").into());
                    }
                },

                Some(Err(e)) => {
                    return Err(SendError::invalid_body(format!("response body failed after commit: {e}")).into());
                }

                None => {
                    self.framed_write.feed(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                    SinkExt::<WireMessage>::flush(&mut self.framed_write).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Engine-generated response carrying no body, always closing.
    async fn send_synthetic_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let response = Response::builder().status(status).body(Empty::<Bytes>::new()).unwrap();
        self.send_response(response, true).await
    }

    /// Flushes whatever is buffered and shuts the write half down.
    async fn finish(mut self) -> Result<(), HttpError> {
        SinkExt::<WireMessage>::flush(&mut self.framed_write).await?;
        self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
        Ok(())
    }
}
