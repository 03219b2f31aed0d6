use std::io;
use std::path::PathBuf;

/// Failures raised by connectors, listeners and transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    #[error("cannot reach peer at {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("accept on listening socket failed: {0}")]
    Accept(io::Error),

    /// Read or write on an established stream failed.
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),

    /// `sun_path` cannot hold the requested socket path.
    #[error("socket path {path} is {len} bytes; the limit is {max}")]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    /// No peer is attached (never connected, or the peer went away).
    #[error("no peer connected")]
    NotConnected,

    /// This transport was closed locally.
    #[error("transport already closed")]
    Shutdown,
}

impl TransportError {
    /// True when the failure means there is no usable peer, as opposed to an
    /// I/O fault on a live one.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, TransportError::NotConnected | TransportError::Shutdown)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
