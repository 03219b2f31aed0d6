use linewire_codec::CodecError;
use linewire_transport::TransportError;

/// Errors that can occur while assembling or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header line was malformed (bad UTF-8, embedded newline, too long).
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// The body length line was not a non-negative decimal integer.
    #[error("invalid frame length {0:?}")]
    InvalidLength(String),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload could not be indexed or read.
    #[error("frame payload error: {0}")]
    Codec(#[from] CodecError),

    /// Writing to the transport failed.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
