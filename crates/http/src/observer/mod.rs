//! Engine instrumentation.
//!
//! [`ServerObserver`] is a capability handed to the engine: a fixed event
//! vocabulary invoked synchronously from the accept loop, the connection
//! tasks and the shutdown path. Implementations must be cheap and must not
//! panic, since they run on the hot path of every connection.
//!
//! Two counting implementations are provided. [`CountingObserver::relaxed`]
//! uses relaxed atomic ordering: updates are cheap but a concurrent reader
//! may observe counts late. [`CountingObserver::strict`] uses sequentially
//! consistent ordering for readers that need exact cross-counter agreement.

mod instrument;

pub(crate) use instrument::ObservedStream;

use std::sync::atomic::{AtomicU64, Ordering};

/// Observer of engine lifecycle events.
///
/// All methods default to no-ops, so implementations only override the
/// events they care about.
pub trait ServerObserver: Send + Sync {
    /// A listener accepted a new connection.
    fn connection_accepted(&self) {}

    /// A request preamble failed to parse or violated a limit.
    fn bad_request(&self) {}

    /// `n` bytes arrived from a peer.
    fn bytes_read(&self, n: usize) {
        let _ = n;
    }

    /// `n` bytes were written towards a peer.
    fn bytes_written(&self, n: usize) {
        let _ = n;
    }

    /// A connection task began running.
    fn task_started(&self) {}

    /// A connection task terminated, normally or not.
    fn task_exited(&self) {}

    /// All listeners are bound and accepting.
    fn server_ready(&self) {}

    /// A connection was force-closed at the shutdown drain deadline.
    fn connection_aborted(&self) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ServerObserver for NoopObserver {}

/// Observer that counts every event.
///
/// The memory ordering is chosen at construction: [`relaxed`](Self::relaxed)
/// trades read-side precision for the cheapest possible update,
/// [`strict`](Self::strict) makes every update immediately visible in order.
#[derive(Debug)]
pub struct CountingObserver {
    ordering: Ordering,
    connections_accepted: AtomicU64,
    bad_requests: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    tasks_started: AtomicU64,
    tasks_exited: AtomicU64,
    connections_aborted: AtomicU64,
    ready: AtomicU64,
}

impl CountingObserver {
    pub fn relaxed() -> Self {
        Self::with_ordering(Ordering::Relaxed)
    }

    pub fn strict() -> Self {
        Self::with_ordering(Ordering::SeqCst)
    }

    fn with_ordering(ordering: Ordering) -> Self {
        Self {
            ordering,
            connections_accepted: AtomicU64::new(0),
            bad_requests: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_exited: AtomicU64::new(0),
            connections_aborted: AtomicU64::new(0),
            ready: AtomicU64::new(0),
        }
    }

    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(self.ordering)
    }

    pub fn bad_requests(&self) -> u64 {
        self.bad_requests.load(self.ordering)
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.bytes_read.load(self.ordering)
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.bytes_written.load(self.ordering)
    }

    pub fn tasks_started(&self) -> u64 {
        self.tasks_started.load(self.ordering)
    }

    pub fn tasks_exited(&self) -> u64 {
        self.tasks_exited.load(self.ordering)
    }

    pub fn connections_aborted(&self) -> u64 {
        self.connections_aborted.load(self.ordering)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(self.ordering) > 0
    }
}

impl ServerObserver for CountingObserver {
    fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, self.ordering);
    }

    fn bad_request(&self) {
        self.bad_requests.fetch_add(1, self.ordering);
    }

    fn bytes_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, self.ordering);
    }

    fn bytes_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, self.ordering);
    }

    fn task_started(&self) {
        self.tasks_started.fetch_add(1, self.ordering);
    }

    fn task_exited(&self) {
        self.tasks_exited.fetch_add(1, self.ordering);
    }

    fn server_ready(&self) {
        self.ready.fetch_add(1, self.ordering);
    }

    fn connection_aborted(&self) {
        self.connections_aborted.fetch_add(1, self.ordering);
    }
}
