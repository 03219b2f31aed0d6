//! Line-delimited framing for linewire.
//!
//! Every frame starts with three text lines:
//! - the command (empty for a response)
//! - the message id used to correlate responses
//! - the mode: `0` when the payload sits in a spool file, `1` when it is inline
//!
//! A file-mode frame then carries the spool path on one line. A memory-mode
//! frame carries the payload byte length on one line, the raw payload, and a
//! single `\n` separator when the payload does not already end with one.
//!
//! [`FrameAssembler`] rebuilds frames from however the transport chunks the
//! stream; [`FrameWriter`] writes them out in bounded chunks.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod writer;

pub use assembler::FrameAssembler;
pub use codec::{
    encode_frame, encode_header, Frame, FrameConfig, MsgMode, Payload, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_PAYLOAD, MAX_LINE_LEN,
};
pub use error::{FrameError, Result};
pub use writer::FrameWriter;
