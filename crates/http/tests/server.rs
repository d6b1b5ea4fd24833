//! Server lifecycle tests over real sockets.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

use keel_http::codec::body::PayloadDecoder;
use keel_http::handler::make_handler;
use keel_http::observer::{CountingObserver, ServerObserver};
use keel_http::protocol::PayloadItem;
use keel_http::protocol::body::ReqBody;
use keel_http::server::{Server, ServerConfig, ServerHandle};

type BoxError = Box<dyn Error + Send + Sync>;

async fn hello(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    Ok(Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from_static(b"Hello World!"))).unwrap())
}

/// Sleeps forever on `/slow`, answers immediately otherwise.
async fn routed(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    if request.uri().path() == "/slow" {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    hello(request).await
}

async fn start_server(config: ServerConfig, observer: Arc<dyn ServerObserver>) -> ServerHandle {
    Server::builder()
        .bind("127.0.0.1:0")
        .handler(make_handler(routed))
        .config(config)
        .observer(observer)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

/// Reads from `stream` until the buffer ends with `suffix`.
async fn read_until_suffix(stream: &mut TcpStream, suffix: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before expected suffix");
        out.extend_from_slice(&buf[..n]);
        if out.ends_with(suffix) {
            return out;
        }
    }
}

#[tokio::test]
async fn serves_requests_over_tcp() {
    let observer = Arc::new(CountingObserver::strict());
    let handle = start_server(ServerConfig::default(), Arc::clone(&observer) as Arc<dyn ServerObserver>).await;
    let addr = handle.local_addrs()[0];

    assert!(observer.is_ready());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n").await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let text = String::from_utf8_lossy(&out);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("Hello World!"));

    handle.shutdown().await;

    assert_eq!(observer.connections_accepted(), 1);
    assert_eq!(observer.tasks_started(), 1);
    assert_eq!(observer.tasks_exited(), 1);
    assert!(observer.total_bytes_read() > 0);
    assert!(observer.total_bytes_written() > 0);
}

#[tokio::test]
async fn shutdown_force_closes_unresponsive_connection_within_drain_budget() {
    let drain = Duration::from_millis(300);
    let config = ServerConfig { drain_timeout: drain, ..ServerConfig::default() };
    let observer = Arc::new(CountingObserver::strict());
    let handle = start_server(config, Arc::clone(&observer) as Arc<dyn ServerObserver>).await;
    let addr = handle.local_addrs()[0];

    // connection A: one complete exchange, then idle in keep-alive
    let mut idle = TcpStream::connect(addr).await.unwrap();
    idle.write_all(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
    read_until_suffix(&mut idle, b"Hello World!").await;

    // connection B: stuck in its handler, deliberately unresponsive
    let mut stuck = TcpStream::connect(addr).await.unwrap();
    stuck.write_all(b"GET /slow HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
    // give the request time to reach the handler
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    handle.shutdown().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= drain, "force-close should not happen before the drain budget, took {elapsed:?}");
    assert!(elapsed < drain + Duration::from_secs(2), "shutdown overran the drain budget, took {elapsed:?}");

    // the idle connection was closed gracefully at its request boundary
    let mut buf = [0u8; 64];
    assert_eq!(idle.read(&mut buf).await.unwrap(), 0);

    // the stuck connection's stream ended up closed, one way or another
    let read = stuck.read(&mut buf).await;
    assert!(matches!(read, Ok(0) | Err(_)));

    assert_eq!(observer.connections_accepted(), 2);
    assert_eq!(observer.tasks_exited(), 2);
    assert_eq!(observer.connections_aborted(), 1);
}

#[tokio::test]
async fn shutdown_with_no_connections_is_immediate() {
    let config = ServerConfig { drain_timeout: Duration::from_secs(10), ..ServerConfig::default() };
    let handle = start_server(config, Arc::new(CountingObserver::relaxed())).await;

    let started = Instant::now();
    handle.shutdown().await;

    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn serves_on_multiple_listeners() {
    let handle = Server::builder()
        .bind("127.0.0.1:0")
        .bind("127.0.0.1:0")
        .handler(make_handler(hello))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    assert_eq!(handle.local_addrs().len(), 2);

    for addr in handle.local_addrs().to_vec() {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n").await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("HTTP/1.1 200 OK\r\n"));
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn compressed_response_round_trips() {
    use std::io::Read;

    let big = make_handler(|_request: Request<ReqBody>| async {
        Ok::<_, BoxError>(Response::new(Full::new(Bytes::from(vec![b'z'; 8192]))))
    });

    let config = ServerConfig { compress: true, ..ServerConfig::default() };
    let handle =
        Server::builder().bind("127.0.0.1:0").handler(big).config(config).build().unwrap().start().await.unwrap();
    let addr = handle.local_addrs()[0];

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: a\r\nAccept-Encoding: gzip\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();

    let split = out.windows(4).position(|w| w == b"\r\n\r\n").expect("preamble terminator missing") + 4;
    let preamble = String::from_utf8_lossy(&out[..split]).to_lowercase();
    assert!(preamble.contains("content-encoding: gzip"));
    assert!(preamble.contains("transfer-encoding: chunked"));
    assert!(!preamble.contains("content-length"));

    // un-chunk, then decompress
    let mut chunked = BytesMut::from(&out[split..]);
    let mut decoder = PayloadDecoder::chunked();
    let mut compressed = Vec::new();
    loop {
        match decoder.decode(&mut chunked).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => compressed.extend_from_slice(&bytes),
            Some(PayloadItem::Eof) => break,
            None => panic!("truncated chunked body"),
        }
    }

    let mut gz = flate2::read::GzDecoder::new(&compressed[..]);
    let mut plain = Vec::new();
    gz.read_to_end(&mut plain).unwrap();
    assert_eq!(plain, vec![b'z'; 8192]);

    handle.shutdown().await;
}
