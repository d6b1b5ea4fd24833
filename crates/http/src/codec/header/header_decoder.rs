//! Request preamble decoder.
//!
//! Parses the status line and header block with `httparse`, then resolves the
//! request's body framing exactly once. Parsing is zero-copy: header name and
//! value positions are recorded as byte ranges into the preamble slice, which
//! is then split off the read buffer and shared into the `HeaderMap`.
//!
//! Bytes past the blank line (a body, or the start of a pipelined request)
//! are left untouched in the read buffer and replayed by the body decoder.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};
use crate::utils::ensure;

/// Maximum number of header fields in a request.
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Decodes a [`RequestHeader`] and its resolved [`PayloadSize`] from raw
/// bytes, enforcing the configured header-block size limit.
pub struct HeaderDecoder {
    max_header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest parsable preamble: "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
            return Ok(None);
        }

        let mut parsed = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            // SAFETY: an array of MaybeUninit does not require initialization
            unsafe { MaybeUninit::uninit().assume_init() };

        let status = parsed.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match status {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                // a preamble that cannot fit the limit will never complete
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };

        trace!(preamble_bytes = body_offset, "parsed request preamble");
        ensure!(body_offset <= self.max_header_bytes, ParseError::too_large_header(body_offset, self.max_header_bytes));

        let header_count = parsed.headers.len();
        ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

        let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
        HeaderIndex::record(src, parsed.headers, &mut header_index);

        let version = match parsed.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            version => return Err(ParseError::InvalidVersion(version)),
        };

        let mut builder = Request::builder()
            .method(parsed.method.ok_or(ParseError::InvalidMethod)?)
            .uri(parsed.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        // detach the preamble from the read buffer; body bytes stay behind
        let preamble = src.split_to(body_offset).freeze();

        if let Some(headers) = builder.headers_mut() {
            headers.reserve(header_count);
            for index in &header_index[..header_count] {
                // SAFETY: httparse verified the name is valid ASCII and the
                // value contains only visible ASCII characters
                let name = HeaderName::from_bytes(&preamble[index.name.0..index.name.1])
                    .map_err(|e| ParseError::invalid_header(e.to_string()))?;
                let value =
                    unsafe { HeaderValue::from_maybe_shared_unchecked(preamble.slice(index.value.0..index.value.1)) };
                headers.append(name, value);
            }
        }

        let header =
            RequestHeader::from(builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?);
        let payload_size = resolve_body_mode(&header)?;

        Ok(Some((header, payload_size)))
    }
}

/// Byte ranges of one header's name and value within the preamble slice.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let base = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - base;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - base;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Resolves the request's body framing, exactly once per request.
///
/// Priority per RFC 9112: a `Transfer-Encoding` naming chunked wins over any
/// `Content-Length`; otherwise a valid `Content-Length` sets an exact size;
/// with neither header the request is bodyless (servers never read request
/// bodies until close).
fn resolve_body_mode(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let headers = header.headers();

    if is_chunked(headers.get(http::header::TRANSFER_ENCODING)) {
        return Ok(PayloadSize::Chunked);
    }

    match headers.get(http::header::CONTENT_LENGTH) {
        Some(value) => {
            let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ASCII"))?;
            let length = text
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {text} is not a non-negative integer")))?;
            Ok(PayloadSize::Length(length))
        }
        None => Ok(PayloadSize::Empty),
    }
}

/// Chunked applies only when it is the final listed transfer coding.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method, Version};
    use indoc::indoc;

    fn decode(input: &str) -> Result<Option<(RequestHeader, PayloadSize)>, ParseError> {
        let mut src = BytesMut::from(input);
        HeaderDecoder::new(8 * 1024).decode(&mut src)
    }

    #[test]
    fn parses_curl_get() {
        let input = indoc! {"
            GET /index.html HTTP/1.1\r
            Host: 127.0.0.1:8080\r
            User-Agent: curl/7.79.1\r
            Accept: */*\r
            \r
        "};

        let (header, payload_size) = decode(input).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::HOST).unwrap(), "127.0.0.1:8080");
        assert_eq!(header.headers().get(http::header::USER_AGENT).unwrap(), "curl/7.79.1");
    }

    #[test]
    fn leaves_body_bytes_in_buffer() {
        let input = "POST /submit HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /next";
        let mut src = BytesMut::from(input);

        let (_, payload_size) = HeaderDecoder::new(8 * 1024).decode(&mut src).unwrap().unwrap();

        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(&src[..], b"abcGET /next");
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let input = "POST / HTTP/1.1\r\nContent-Length: 100\r\nTransfer-Encoding: chunked\r\n\r\n";
        let (_, payload_size) = decode(input).unwrap().unwrap();
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn gzip_then_chunked_is_chunked() {
        let input = "POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";
        let (_, payload_size) = decode(input).unwrap().unwrap();
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn chunked_must_be_final_coding() {
        let mut headers = HeaderMap::new();
        headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
    }

    #[test]
    fn content_length_sets_exact_size() {
        let input = "POST / HTTP/1.1\r\nContent-Length: 42\r\n\r\n";
        let (_, payload_size) = decode(input).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Length(42));
    }

    #[test]
    fn rejects_malformed_content_length() {
        let input = "POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n";
        assert!(matches!(decode(input), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn incomplete_preamble_needs_more_data() {
        assert!(decode("GET /index.html HTTP/1.1\r\nHost: example").unwrap().is_none());
    }

    #[test]
    fn oversized_request_line_is_rejected_while_partial() {
        let mut decoder = HeaderDecoder::new(64);
        let long_target = "a".repeat(200);
        let mut src = BytesMut::from(format!("GET /{long_target} HTTP/1.1\r\n").as_str());

        assert!(matches!(decoder.decode(&mut src), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn oversized_complete_preamble_is_rejected() {
        let mut decoder = HeaderDecoder::new(32);
        let mut src = BytesMut::from("GET / HTTP/1.1\r\nX-Filler: aaaaaaaaaaaaaaaaaaaa\r\n\r\n");

        assert!(matches!(decoder.decode(&mut src), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn rejects_unsupported_version() {
        assert!(matches!(decode("GET / HTTP/0.9\r\n\r\n"), Err(_)));
    }
}
