//! The accept loop.
//!
//! One acceptor per bound address. The loop blocks on nothing but `accept`
//! and the shutdown signal: decoration (TLS), framing and request handling
//! all happen on the connection's own spawned task, dispatched
//! fire-and-forget.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body::Body;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::connection::HttpConnection;
use crate::handler::Handler;
use crate::observer::{ObservedStream, ServerObserver};
use crate::server::registry::ConnectionRegistry;
use crate::server::transport::{BoxStream, TransportDecorator};
use crate::server::ServerConfig;

pub(crate) struct Acceptor<H> {
    pub(crate) listener: TcpListener,
    pub(crate) decorator: Option<Arc<dyn TransportDecorator>>,
    pub(crate) handler: Arc<H>,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) observer: Arc<dyn ServerObserver>,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown: CancellationToken,
}

impl<H> Acceptor<H>
where
    H: Handler + 'static,
    <H::RespBody as Body>::Error: Display,
{
    /// Accepts until the shutdown token fires, then exits, dropping (and so
    /// closing) the listening socket.
    pub(crate) async fn run(self) {
        loop {
            let accepted = select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) => {
                    // transient accept failure; the listener itself is fine
                    warn!(cause = %e, "failed to accept connection");
                }
            }
        }

        info!("listener stopped accepting");
    }

    /// Hands the stream to a fresh connection task. Never waits on it.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        self.observer.connection_accepted();
        trace!(%peer, "accepted connection");

        let decorator = self.decorator.clone();
        let handler = Arc::clone(&self.handler);
        let config = Arc::clone(&self.config);
        let observer = Arc::clone(&self.observer);
        let shutdown = self.shutdown.clone();

        self.registry.spawn_on(&self.tracker, Arc::clone(&self.observer), async move {
            let stream: BoxStream = match decorator {
                Some(decorator) => match decorator.decorate(stream).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(%peer, "transport decoration failed: {e}");
                        return;
                    }
                },
                None => Box::new(stream),
            };

            let observed = ObservedStream::new(stream, Arc::clone(&observer));
            let (reader, writer) = tokio::io::split(observed);

            let connection = HttpConnection::new(reader, writer, config.as_ref().clone())
                .with_observer(observer)
                .with_shutdown(shutdown);

            match connection.process(handler).await {
                Ok(()) => trace!(%peer, "connection finished"),
                Err(e) => debug!(%peer, "connection ended with error: {e}"),
            }
        });
    }
}
