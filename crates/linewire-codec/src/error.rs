use std::sync::Arc;

use crate::value::FieldType;

/// Errors that can occur while encoding, decoding or indexing payloads.
///
/// Cloneable so a failed payload can keep answering with the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// Only structs, lists, void and error values may appear at the top level.
    #[error("top-level value must be a struct, list, void or error (got {0})")]
    TopLevelScalar(FieldType),

    /// A type tag line did not name a known type.
    #[error("unknown type tag {0:?}")]
    UnknownTag(String),

    /// A list mixed element types.
    #[error("list elements must share one type: expected {expected}, found {found} at index {index}")]
    HeterogeneousList {
        expected: FieldType,
        found: FieldType,
        index: usize,
    },

    /// Void and error values cannot be nested inside a struct or list.
    #[error("{0} is not valid as a field or list element")]
    UnsupportedFieldValue(FieldType),

    /// Field names are single lines.
    #[error("invalid field name {0:?}: names must not contain a newline")]
    InvalidFieldName(String),

    /// Lists and structs nested deeper than the codec accepts.
    #[error("value nests deeper than {0} levels")]
    TooDeep(usize),

    /// A struct named the same field twice.
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    #[error("invalid double {0:?}")]
    InvalidDouble(String),

    #[error("invalid bool {0:?} (expected \"true\" or \"false\")")]
    InvalidBool(String),

    #[error("invalid length {0:?}")]
    InvalidLength(String),

    /// A line or string payload was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the top-level value.
    #[error("{0} trailing bytes after top-level value")]
    TrailingData(u64),

    /// The value has no JSON (or no wire) representation.
    #[error("cannot represent value: {0}")]
    Unrepresentable(String),

    /// File spooling was requested from a storage backend without a filesystem.
    #[error("file storage is unavailable")]
    StorageUnavailable,

    #[error("codec I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(Arc::new(err))
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
