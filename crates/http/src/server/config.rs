//! Engine configuration.

use std::time::Duration;

/// Tunables consumed by the engine. Immutable once a server is started.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a fresh connection may take to deliver its first preamble.
    pub read_timeout: Duration,

    /// How long an idle keep-alive connection waits for the next request.
    pub keep_alive_timeout: Duration,

    /// Total budget for graceful shutdown, measured from the moment the
    /// listeners stop accepting. Connections still alive afterwards are
    /// force-closed.
    pub drain_timeout: Duration,

    /// Upper bound on a request preamble (status line plus header block).
    pub max_header_bytes: usize,

    /// How many unread request-body bytes are worth discarding to keep a
    /// connection reusable. Anything larger closes the connection instead.
    pub max_drain_bytes: u64,

    /// Whether response bodies may be compressed when the client offers an
    /// acceptable coding.
    pub compress: bool,

    /// Bodies at or below this known size are never compressed.
    pub min_compress_bytes: u64,

    /// Initial capacity of the per-connection read buffer.
    pub read_buffer_size: usize,

    /// Capacity of the buffered writer under the response encoder.
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(10),
            max_header_bytes: 8 * 1024,
            max_drain_bytes: 64 * 1024,
            compress: false,
            min_compress_bytes: 1024,
            read_buffer_size: 8 * 1024,
            write_buffer_size: 8 * 1024,
        }
    }
}
