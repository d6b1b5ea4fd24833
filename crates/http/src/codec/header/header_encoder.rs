//! Response preamble encoder.
//!
//! Serializes the committed response head: status line, the header block with
//! the framing header forced to match the committed body mode, and the blank
//! line. Called exactly once per exchange; commit is irrevocable.

use std::io;
use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial reservation for the serialized preamble.
const INIT_HEADER_SIZE: usize = 4 * 1024;

pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported response version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };
        let status = head.status();
        write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), status.canonical_reason().unwrap_or(""))?;

        // the framing header always reflects the committed body mode
        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty => {
                head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        for (name, value) in head.headers().iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        Ok(())
    }
}

/// Writes into the already-reserved `BytesMut` without intermediate buffers.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn writes_status_line_and_terminator() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode(head, PayloadSize::Empty);

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn empty_body_declares_zero_length() {
        let head = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        let wire = encode(head, PayloadSize::Empty);
        assert!(wire.contains("content-length: 0\r\n"));
    }

    #[test]
    fn length_mode_sets_content_length() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode(head, PayloadSize::Length(1234));
        assert!(wire.contains("content-length: 1234\r\n"));
        assert!(!wire.contains("transfer-encoding"));
    }

    #[test]
    fn chunked_mode_sets_transfer_encoding() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode(head, PayloadSize::Chunked);
        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(!wire.contains("content-length"));
    }

    #[test]
    fn stale_length_header_is_replaced() {
        let head =
            Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "999").body(()).unwrap();
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, PayloadSize::Length(4)), &mut dst).unwrap();
        let wire = String::from_utf8(dst.to_vec()).unwrap();

        assert!(wire.contains("content-length: 4\r\n"));
        assert!(!wire.contains("999"));
    }

    #[test]
    fn custom_headers_are_preserved() {
        let head = Response::builder()
            .status(StatusCode::OK)
            .header("x-request-id", "abc123")
            .header(header::CONNECTION, "close")
            .body(())
            .unwrap();
        let wire = encode(head, PayloadSize::Empty);

        assert!(wire.contains("x-request-id: abc123\r\n"));
        assert!(wire.contains("connection: close\r\n"));
    }
}
