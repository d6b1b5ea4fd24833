//! Wire codecs for HTTP/1.1 framing.
//!
//! Built on `tokio_util::codec`: [`RequestDecoder`] turns the inbound byte
//! stream into preamble + body messages, [`ResponseEncoder`] turns outbound
//! messages back into framed bytes. Both are two-phase state machines that
//! alternate between a header codec and the body codec resolved for the
//! current message.

pub mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
