//! Encoder for bodies with a declared `Content-Length`.

use std::cmp;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

/// Passes body bytes through verbatim, clamped to the committed length.
///
/// Writing past the declared length cannot be transmitted without corrupting
/// the framing, so the excess is dropped with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// Whether the full declared length has been written.
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut data) => {
                if !data.has_remaining() {
                    return Ok(());
                }

                if self.remaining == 0 {
                    warn!(extra = data.remaining(), "body bytes past the declared content-length, dropping");
                    return Ok(());
                }

                let take = cmp::min(self.remaining, data.remaining() as u64) as usize;
                if (take as u64) < data.remaining() as u64 {
                    warn!(
                        declared_remaining = take,
                        offered = data.remaining(),
                        "body write exceeds declared content-length, truncating"
                    );
                }

                dst.put(data.take(take));
                self.remaining -= take as u64;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return Err(SendError::invalid_body("body ended short of the declared content-length"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn passes_bytes_through_verbatim() {
        let mut encoder = LengthEncoder::new(11);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello ")), &mut dst).unwrap();
        assert!(!encoder.is_finished());
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"world")), &mut dst).unwrap();

        assert_eq!(&dst[..], b"hello world");
        assert!(encoder.is_finished());
    }

    #[test]
    fn truncates_overflowing_write() {
        let mut encoder = LengthEncoder::new(4);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"too much data")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"too ");
        assert!(encoder.is_finished());

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"more")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"too ");
    }
}
