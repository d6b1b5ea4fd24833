//! An asynchronous HTTP/1.1 server engine
//!
//! This crate implements the server side of HTTP/1.1 from the bytes up:
//! request framing, streaming bodies, chunked transfer coding, keep-alive,
//! response compression and graceful multi-connection shutdown, built on
//! tokio. It deliberately stops below routing: the application seam is a
//! single [`handler::Handler`] invocation per request.
//!
//! # Features
//!
//! - Full HTTP/1.1 framing: `Content-Length`, chunked transfer coding,
//!   pipelining carry-over, expect-continue
//! - Streaming request and response bodies over `http_body::Body`
//! - One lightweight task per connection, no bounded worker pool
//! - Keep-alive with per-phase timeouts and a bounded body-drain policy
//! - Optional response compression (zstd, brotli, gzip, deflate)
//! - Coordinated shutdown: stop accepting, drain within a budget,
//!   force-close stragglers
//! - A pluggable [`observer::ServerObserver`] for engine events
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//!
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//! use tracing::{Level, info};
//! use tracing_subscriber::FmtSubscriber;
//!
//! use keel_http::handler::make_handler;
//! use keel_http::protocol::body::ReqBody;
//! use keel_http::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber)?;
//!
//!     let server = Server::builder()
//!         .bind("127.0.0.1:8080")
//!         .handler(make_handler(hello_world))
//!         .build()?;
//!
//!     let handle = server.start().await?;
//!     info!(addrs = ?handle.local_addrs(), "serving");
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//!
//! async fn hello_world(
//!     request: Request<ReqBody>,
//! ) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), "handling request");
//!
//!     let body = Full::new(Bytes::from_static(b"Hello World!\r\n"));
//!     Ok(Response::builder().status(StatusCode::OK).body(body)?)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: framed wire codecs for preambles and bodies
//! - [`protocol`]: message vocabulary, preamble types, the body facade,
//!   error taxonomy
//! - [`connection`]: the per-connection state machine
//! - [`encoding`]: response compression, decided at commit time
//! - [`server`]: listeners, configuration, shutdown coordination
//! - [`handler`]: the application seam
//! - [`observer`]: engine instrumentation
//!
//! # Limits
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - At most 64 header fields per request; header block size is configurable
//! - TLS is consumed through [`server::TransportDecorator`], not implemented
//!   here

pub mod codec;
pub mod connection;
pub mod encoding;
pub mod handler;
pub mod observer;
pub mod protocol;
pub mod server;

mod utils;
