//! Encoder for the chunked transfer coding.
//!
//! Every non-empty write becomes one self-contained chunk: the hex size line,
//! the data, and a CRLF. Finishing the stream emits the terminal zero-length
//! chunk; no trailers are produced.

use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    finished: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { finished: false }
    }

    /// Whether the terminal zero-length chunk has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.finished {
            warn!("chunked stream already terminated, dropping payload item");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(data) if data.has_remaining() => {
                let size = data.remaining();
                write!(writer::BufWriter(dst), "{size:X}\r\n")?;
                dst.reserve(size + 2);
                dst.put(data);
                dst.extend_from_slice(b"\r\n");
            }
            // a zero-length write is not a chunk: "0" would terminate the stream
            PayloadItem::Chunk(_) => {}
            PayloadItem::Eof => {
                self.finished = true;
                dst.extend_from_slice(b"0\r\n\r\n");
            }
        }

        Ok(())
    }
}

mod writer {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub(super) struct BufWriter<'a>(pub &'a mut BytesMut);

    impl io::Write for BufWriter<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
