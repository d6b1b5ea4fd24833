//! Streaming request decoder.
//!
//! Two-phase state machine over the read buffer: while no body decoder is
//! armed the decoder parses preambles; once a preamble resolves its body mode
//! the matching [`PayloadDecoder`] takes over until it reports end-of-stream.
//! This ordering is what keeps pipelined requests strictly sequential: the
//! next preamble is not even looked at until the current body is done.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    /// Creates a decoder enforcing the given header-block size limit.
    pub fn new(max_header_bytes: usize) -> Self {
        Self { header_decoder: HeaderDecoder::new(max_header_bytes), payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body complete, switch back to preamble parsing
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 8 * 1024;

    fn next_header(decoder: &mut RequestDecoder, src: &mut BytesMut) -> (RequestHeader, PayloadSize) {
        match decoder.decode(src).unwrap() {
            Some(Message::Header(parts)) => parts,
            other => panic!("expected header, got {:?}", other.map(|m| m.is_payload())),
        }
    }

    fn drain_body(decoder: &mut RequestDecoder, src: &mut BytesMut) -> Vec<u8> {
        let mut body = Vec::new();
        loop {
            match decoder.decode(src).unwrap() {
                Some(Message::Payload(PayloadItem::Chunk(bytes))) => body.extend_from_slice(&bytes),
                Some(Message::Payload(PayloadItem::Eof)) => return body,
                Some(Message::Header(_)) => panic!("header mid-body"),
                None => panic!("decoder stalled"),
            }
        }
    }

    #[test]
    fn bodyless_request_yields_immediate_eof() {
        let mut decoder = RequestDecoder::new(LIMIT);
        let mut src = BytesMut::from("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");

        let (_, payload_size) = next_header(&mut decoder, &mut src);
        assert!(payload_size.is_empty());
        assert!(drain_body(&mut decoder, &mut src).is_empty());
    }

    #[test]
    fn over_read_body_bytes_are_replayed() {
        // preamble and body arrive in one network read; the carry-over must
        // feed the body decoder, not be dropped
        let mut decoder = RequestDecoder::new(LIMIT);
        let mut src = BytesMut::from("POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");

        let (header, payload_size) = next_header(&mut decoder, &mut src);
        assert_eq!(header.uri().path(), "/upload");
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(drain_body(&mut decoder, &mut src), b"hello");
    }

    #[test]
    fn chunked_body_decodes_through_the_chunked_codec() {
        let mut decoder = RequestDecoder::new(LIMIT);
        let mut src = BytesMut::from(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );

        let (_, payload_size) = next_header(&mut decoder, &mut src);
        assert!(payload_size.is_chunked());
        assert_eq!(drain_body(&mut decoder, &mut src), b"Wikipedia");
    }

    #[test]
    fn pipelined_requests_decode_sequentially() {
        let mut decoder = RequestDecoder::new(LIMIT);
        let mut src = BytesMut::from(
            "POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nabGET /b HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );

        let (first, _) = next_header(&mut decoder, &mut src);
        assert_eq!(first.uri().path(), "/a");
        assert_eq!(drain_body(&mut decoder, &mut src), b"ab");

        let (second, payload_size) = next_header(&mut decoder, &mut src);
        assert_eq!(second.uri().path(), "/b");
        assert!(payload_size.is_empty());
    }

    #[test]
    fn body_split_across_reads_yields_declared_total() {
        let mut decoder = RequestDecoder::new(LIMIT);
        let mut src = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123");

        let (_, payload_size) = next_header(&mut decoder, &mut src);
        assert_eq!(payload_size, PayloadSize::Length(10));

        let mut body = Vec::new();
        while let Some(Message::Payload(PayloadItem::Chunk(bytes))) = decoder.decode(&mut src).unwrap() {
            body.extend_from_slice(&bytes);
        }
        src.extend_from_slice(b"456789");
        body.extend_from_slice(&drain_body(&mut decoder, &mut src));

        assert_eq!(body, b"0123456789");
    }
}
