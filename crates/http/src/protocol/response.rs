//! Response preamble types.

use http::Response;

/// The head of a response before its body is attached: status, version and
/// headers, with an empty body placeholder.
pub type ResponseHead = Response<()>;
