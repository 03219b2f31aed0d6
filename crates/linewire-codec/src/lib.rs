//! Line-oriented, type-tagged value codec for linewire.
//!
//! Payloads are trees of dynamically-typed [`Value`]s written as
//! newline-terminated text lines interleaved with length-prefixed raw byte
//! runs:
//! - every value is introduced by a numeric type tag
//! - strings carry an exact byte length, so they may contain newlines
//! - lists are homogeneous and name their element type once
//!
//! Payloads live in memory or in a spool file (see [`Storage`]); both are
//! read through the same [`LineReader`]. A [`FieldIndex`] gives random access
//! to individual fields without decoding the whole payload.

pub mod cursor;
pub mod decode;
pub mod encode;
pub mod error;
pub mod index;
pub mod json;
pub mod storage;
pub mod value;

pub use cursor::{LineReader, LineWriter};
pub use decode::{decode, decode_body, decode_file, decode_from, read_body, MAX_DEPTH};
pub use encode::{encode, encode_error, encode_to, encode_to_spool, encode_void};
pub use error::{CodecError, Result};
pub use index::{FieldIndex, FieldInfo, Source};
pub use json::{from_value, to_value};
pub use storage::{FsStorage, MemoryStorage, Storage, DEFAULT_SPOOL_DIR};
pub use value::{FieldType, Value};
