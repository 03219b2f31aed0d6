use std::fmt;
use std::io;

use linewire_client::ContextError;
use linewire_codec::CodecError;
use linewire_frame::FrameError;
use linewire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: &CodecError) -> CliError {
    match err {
        CodecError::Io(source) => io_error(context, source),
        CodecError::StorageUnavailable => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: &FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::Codec(err) => codec_error(context, err),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn context_error(context: &str, err: &ContextError) -> CliError {
    match err {
        ContextError::Spool(err) | ContextError::Decode(err) | ContextError::Encode(err) => {
            codec_error(context, err)
        }
        ContextError::Transport(err) => transport_error(context, err),
        ContextError::Frame(err) => frame_error(context, err),
        ContextError::NotConnected => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        ContextError::Remote { .. } | ContextError::Cancelled => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_codec_errors_are_data_invalid() {
        let err = codec_error("decode failed", &CodecError::UnexpectedEof);
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(err.message, "decode failed: unexpected end of input");
    }

    #[test]
    fn test_io_kinds_map_to_codes() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(io_error("open", &denied).code, PERMISSION_DENIED);
        let err = CodecError::Io(Arc::new(io::Error::new(io::ErrorKind::NotFound, "gone")));
        assert_eq!(codec_error("read", &err).code, FAILURE);
    }

    #[test]
    fn test_context_errors_unwrap_their_cause() {
        let err = ContextError::Frame(Arc::new(FrameError::PayloadTooLarge { size: 2, max: 1 }));
        assert_eq!(context_error("send", &err).code, DATA_INVALID);
        assert_eq!(
            context_error("send", &ContextError::NotConnected).code,
            TRANSPORT_ERROR
        );
        let remote = ContextError::Remote {
            code: -4,
            message: "bad".into(),
        };
        assert_eq!(context_error("send", &remote).code, FAILURE);
    }
}
