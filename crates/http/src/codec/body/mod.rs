//! Body transfer codecs.
//!
//! Both directions support the two HTTP/1.1 body framings: an explicit
//! `Content-Length` and the chunked transfer coding. [`PayloadDecoder`] and
//! [`PayloadEncoder`] wrap the concrete codecs behind the resolved
//! [`PayloadSize`](crate::protocol::PayloadSize) so the rest of the engine
//! never branches on the framing itself.

pub(crate) mod chunked_decoder;
pub(crate) mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
