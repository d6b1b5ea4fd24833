//! Streaming response encoder with commit-once framing.
//!
//! The first message of an exchange must be the response head; encoding it is
//! the commit point: the framing is fixed from the supplied
//! [`PayloadSize`] and the serialized preamble leaves for the wire. The armed
//! [`PayloadEncoder`] then carries body items until it reports finished,
//! after which the encoder is ready for the next exchange on the same
//! connection. Feeding a second head mid-body is rejected: those bytes cannot
//! be retracted.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};

pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("response head fed while previous body is still streaming");
                    return Err(SendError::HeadAlreadySent);
                }

                self.payload_encoder = Some(payload_size.into());
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("payload item fed before a response head was committed");
                    return Err(SendError::invalid_body("payload before response head"));
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);

                if is_eof && result.is_ok() && payload_encoder.is_finished() {
                    // exchange complete, accept the next head
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
