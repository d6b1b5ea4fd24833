//! Core protocol types shared by the codecs and the connection loop.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: the vocabulary exchanged
//!   between the framed codecs and the connection state machine.
//! - [`RequestHeader`] / [`ResponseHead`]: parsed preambles.
//! - [`HttpError`], [`ParseError`], [`SendError`]: the error taxonomy, with
//!   parse failures on the inbound side and send failures on the outbound.
//! - [`body`]: the body-reading facade handed to request handlers.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;
pub(crate) use request::has_connection_token;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
