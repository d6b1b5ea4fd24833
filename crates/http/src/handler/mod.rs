//! The application seam.
//!
//! A [`Handler`] receives one parsed request (preamble plus the streaming
//! body facade) and produces a response whose body drives the framing: an
//! exact [`Body::size_hint`] commits an explicit `Content-Length`, an
//! unknown one commits chunked transfer coding.
//!
//! Returning `Err` signals failure *before* anything was committed; the
//! engine answers with a synthetic `500`. A failure surfacing from the
//! response body stream happens *after* commit and aborts the connection
//! instead, since those bytes cannot be taken back.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::ReqBody;

#[async_trait]
pub trait Handler: Send + Sync {
    type RespBody: Body<Data = Bytes> + Unpin + Send;
    type Error: Into<Box<dyn Error + Send + Sync>> + Send;

    async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// Adapter turning a plain async function into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Body<Data = Bytes> + Unpin + Send,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>> + Send,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(request).await
    }
}

pub fn make_handler<F, RespBody, Err, Fut>(f: F) -> HandlerFn<F>
where
    RespBody: Body<Data = Bytes> + Unpin + Send,
    Err: Into<Box<dyn Error + Send + Sync>> + Send,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
{
    HandlerFn { f }
}
