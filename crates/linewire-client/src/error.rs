use std::sync::Arc;

use linewire_codec::CodecError;
use linewire_frame::FrameError;
use linewire_transport::TransportError;

/// Errors surfaced by contexts and the client.
///
/// Cloneable so one failure can settle a pending response and stay on the
/// context that caused it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    /// Creating, reading or removing a spool file failed.
    #[error("spool file error: {0}")]
    Spool(CodecError),

    /// The transport is not open.
    #[error("transport not connected")]
    NotConnected,

    #[error("payload decode error: {0}")]
    Decode(CodecError),

    #[error("payload encode error: {0}")]
    Encode(CodecError),

    #[error("transport error: {0}")]
    Transport(Arc<TransportError>),

    #[error("frame error: {0}")]
    Frame(Arc<FrameError>),

    /// The context was destroyed.
    #[error("context destroyed")]
    Destroyed,

    /// The correlation entry was dropped before a response arrived.
    #[error("request cancelled before a response arrived")]
    Cancelled,

    /// Another request with this message id is still in flight.
    #[error("duplicate message id {0:?}")]
    DuplicateMsgId(String),

    /// Only unanswered incoming requests can be replied to.
    #[error("cannot reply: {0}")]
    InvalidReply(&'static str),

    /// The peer answered with an error payload.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl ContextError {
    /// Machine-readable code. Remote errors keep the peer's code.
    pub fn code(&self) -> i64 {
        match self {
            ContextError::Spool(_) => -1,
            ContextError::NotConnected => -2,
            ContextError::Decode(_) => -3,
            ContextError::Encode(_) => -4,
            ContextError::Transport(_) => -5,
            ContextError::Frame(_) => -6,
            ContextError::Destroyed => -7,
            ContextError::Cancelled => -8,
            ContextError::DuplicateMsgId(_) => -9,
            ContextError::InvalidReply(_) => -10,
            ContextError::Remote { code, .. } => *code,
        }
    }

    /// Classify a codec failure that happened while encoding.
    pub(crate) fn encoding(err: CodecError) -> Self {
        if is_storage_error(&err) {
            ContextError::Spool(err)
        } else {
            ContextError::Encode(err)
        }
    }

    /// Classify a codec failure that happened while decoding or indexing.
    pub(crate) fn decoding(err: CodecError) -> Self {
        if is_storage_error(&err) {
            ContextError::Spool(err)
        } else {
            ContextError::Decode(err)
        }
    }
}

fn is_storage_error(err: &CodecError) -> bool {
    matches!(err, CodecError::Io(_) | CodecError::StorageUnavailable)
}

impl From<TransportError> for ContextError {
    fn from(err: TransportError) -> Self {
        if err.is_disconnected() {
            ContextError::NotConnected
        } else {
            ContextError::Transport(Arc::new(err))
        }
    }
}

impl From<FrameError> for ContextError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => err.into(),
            FrameError::Codec(err) => ContextError::decoding(err),
            other => ContextError::Frame(Arc::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
