//! Decoder for the chunked transfer coding
//! ([RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding)).
//!
//! Chunk data is surfaced as soon as it arrives: a partially received chunk
//! still yields its available bytes, so large bodies stream without being
//! assembled in memory first.

use std::cmp;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Incremental decoder for a chunked message body.
///
/// Drives a byte-at-a-time state machine over the line-oriented parts of the
/// coding (size lines, terminators, trailer section) and splits chunk data
/// out of the buffer in bulk. After the terminal zero-length chunk and its
/// trailer section, every further call reports [`PayloadItem::Eof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating hex digits of a chunk-size line.
    Size,
    /// Skipping a chunk extension up to the CR.
    Extension,
    /// Expecting the LF that ends the size line.
    SizeLf,
    /// Splitting chunk data out of the buffer.
    Data,
    /// Expecting the CR after chunk data.
    DataCr,
    /// Expecting the LF after chunk data.
    DataLf,
    /// After the zero-length chunk: either the final CR or a trailer field.
    LastCr,
    /// Consuming a trailer field up to its CR.
    TrailerLine,
    /// Expecting the LF that ends a trailer field.
    TrailerLf,
    /// Expecting the final LF of the message.
    LastLf,
    /// Terminal chunk fully consumed.
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }

    fn accumulate(&mut self, digit: u8) -> Result<(), ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_chunk("chunk size overflows u64"))?;
        Ok(())
    }

    fn step(&mut self, byte: u8) -> Result<State, ParseError> {
        use State::*;

        Ok(match (self.state, byte) {
            (Size, b @ b'0'..=b'9') => {
                self.accumulate(b - b'0')?;
                Size
            }
            (Size, b @ b'a'..=b'f') => {
                self.accumulate(b - b'a' + 10)?;
                Size
            }
            (Size, b @ b'A'..=b'F') => {
                self.accumulate(b - b'A' + 10)?;
                Size
            }
            // LWS after the size is tolerated, but no further digits may follow
            (Size, b' ' | b'\t' | b';') => Extension,
            (Size, b'\r') => SizeLf,
            (Size, _) => return Err(ParseError::invalid_chunk("invalid character in chunk size")),

            // Extensions are ignored wholesale; they end at CRLF. A bare LF is
            // rejected so sloppy peers cannot smuggle an early line ending.
            (Extension, b'\r') => SizeLf,
            (Extension, b'\n') => return Err(ParseError::invalid_chunk("bare LF inside chunk extension")),
            (Extension, _) => Extension,

            (SizeLf, b'\n') => {
                if self.remaining == 0 {
                    LastCr
                } else {
                    Data
                }
            }
            (SizeLf, _) => return Err(ParseError::invalid_chunk("chunk size line must end with CRLF")),

            (DataCr, b'\r') => DataLf,
            (DataCr, _) => return Err(ParseError::invalid_chunk("chunk data not followed by CR")),
            (DataLf, b'\n') => Size,
            (DataLf, _) => return Err(ParseError::invalid_chunk("chunk data not followed by CRLF")),

            (LastCr, b'\r') => LastLf,
            (LastCr, _) => TrailerLine,
            (TrailerLine, b'\r') => TrailerLf,
            (TrailerLine, _) => TrailerLine,
            (TrailerLf, b'\n') => LastCr,
            (TrailerLf, _) => return Err(ParseError::invalid_chunk("trailer field must end with CRLF")),

            (LastLf, b'\n') => Done,
            (LastLf, _) => return Err(ParseError::invalid_chunk("terminal chunk must end with CRLF CRLF")),

            (Data | Done, _) => unreachable!("bulk states are handled before byte dispatch"),
        })
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::Done {
                trace!("chunked body fully consumed");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            if self.state == State::Data {
                let take = cmp::min(self.remaining, src.len() as u64) as usize;
                let bytes = src.split_to(take).freeze();
                self.remaining -= take as u64;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }
                trace!(len = bytes.len(), "decoded chunk data");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            let byte = src.get_u8();
            self.state = self.step(byte)?;
        }
    }
}
