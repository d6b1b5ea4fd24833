//! Server assembly: listeners, configuration and coordinated shutdown.
//!
//! [`Server`] binds one or more addresses, runs an accept loop per address,
//! and hands every accepted stream to its own connection task. The returned
//! [`ServerHandle`] coordinates graceful shutdown in phases: stop accepting,
//! signal in-flight connections, wait out the drain budget, then force-close
//! whatever is left.

mod config;
mod listener;
mod registry;
mod transport;

pub use config::ServerConfig;
pub use transport::{AsyncStream, BoxStream, TransportDecorator};

use std::fmt::Display;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body::Body;
use thiserror::Error;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::handler::Handler;
use crate::observer::{NoopObserver, ServerObserver};
use listener::Acceptor;
use registry::ConnectionRegistry;

/// One address to serve, with its optional transport decoration.
struct Binding {
    address: SocketAddr,
    decorator: Option<Arc<dyn TransportDecorator>>,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("at least one bind address must be set")]
    MissingAddress,

    #[error("a handler must be set")]
    MissingHandler,

    #[error("invalid bind address: {source}")]
    InvalidAddress {
        #[from]
        source: io::Error,
    },
}

pub struct ServerBuilder<H> {
    bindings: Vec<Binding>,
    bind_error: Option<io::Error>,
    handler: Option<Arc<H>>,
    config: ServerConfig,
    observer: Arc<dyn ServerObserver>,
}

impl<H> ServerBuilder<H> {
    fn new() -> Self {
        Self {
            bindings: Vec::new(),
            bind_error: None,
            handler: None,
            config: ServerConfig::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Adds a plaintext listener address.
    pub fn bind<A: std::net::ToSocketAddrs>(self, address: A) -> Self {
        self.bind_with_transport(address, None)
    }

    /// Adds a listener address whose accepted streams are wrapped by the
    /// given decorator (e.g. a TLS acceptor) before the engine reads them.
    pub fn bind_with_transport<A: std::net::ToSocketAddrs>(
        mut self,
        address: A,
        decorator: Option<Arc<dyn TransportDecorator>>,
    ) -> Self {
        match address.to_socket_addrs() {
            Ok(addresses) => {
                for address in addresses {
                    self.bindings.push(Binding { address, decorator: decorator.clone() });
                }
            }
            Err(e) => self.bind_error = Some(e),
        }
        self
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ServerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Result<Server<H>, ServerBuildError> {
        if let Some(e) = self.bind_error {
            return Err(e.into());
        }
        if self.bindings.is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;

        Ok(Server { bindings: self.bindings, handler, config: Arc::new(self.config), observer: self.observer })
    }
}

pub struct Server<H> {
    bindings: Vec<Binding>,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    observer: Arc<dyn ServerObserver>,
}

impl<H> Server<H>
where
    H: Handler + 'static,
    <H::RespBody as Body>::Error: Display,
{
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder::new()
    }

    /// Binds every configured address and starts accepting.
    ///
    /// Returns once all listeners are live; connections are served on
    /// background tasks until [`ServerHandle::shutdown`] is called.
    pub async fn start(self) -> io::Result<ServerHandle> {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let registry = ConnectionRegistry::default();
        let mut local_addrs = Vec::with_capacity(self.bindings.len());

        for binding in self.bindings {
            let listener = bind_socket(binding.address).await?;
            let local_addr = listener.local_addr()?;
            info!(addr = %local_addr, "listening");
            local_addrs.push(local_addr);

            let acceptor = Acceptor {
                listener,
                decorator: binding.decorator,
                handler: Arc::clone(&self.handler),
                config: Arc::clone(&self.config),
                observer: Arc::clone(&self.observer),
                registry: registry.clone(),
                tracker: tracker.clone(),
                shutdown: shutdown.clone(),
            };
            tracker.spawn(acceptor.run());
        }

        self.observer.server_ready();

        Ok(ServerHandle {
            shutdown,
            tracker,
            registry,
            drain_timeout: self.config.drain_timeout,
            observer: self.observer,
            local_addrs: Arc::new(local_addrs),
        })
    }
}

async fn bind_socket<A: ToSocketAddrs>(address: A) -> io::Result<TcpListener> {
    TcpListener::bind(address).await
}

/// Control handle for a started server.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    registry: ConnectionRegistry,
    drain_timeout: std::time::Duration,
    observer: Arc<dyn ServerObserver>,
    local_addrs: Arc<Vec<SocketAddr>>,
}

impl ServerHandle {
    /// The addresses actually bound, in `bind` order. Useful with port 0.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Blocks until a shutdown has run to completion.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Shuts the server down.
    ///
    /// Phases: (1) stop accepting, so every acceptor exits and its socket
    /// closes; (2) in-flight connections observe the signal at their next
    /// request boundary; (3) wait for tasks to finish, bounded by the drain
    /// budget measured from phase 1; (4) force-close the stragglers.
    pub async fn shutdown(&self) {
        info!("shutdown initiated");
        let deadline = Instant::now() + self.drain_timeout;

        self.shutdown.cancel();
        self.tracker.close();

        if timeout_at(deadline, self.tracker.wait()).await.is_err() {
            let aborted = self.registry.abort_all();
            if aborted > 0 {
                warn!(aborted, "drain budget exhausted, force-closing remaining connections");
                for _ in 0..aborted {
                    self.observer.connection_aborted();
                }
            }
            self.tracker.wait().await;
        }

        info!("shutdown complete");
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").field("local_addrs", &self.local_addrs).finish_non_exhaustive()
    }
}
