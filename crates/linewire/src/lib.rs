//! Line-oriented request/response messaging over pluggable transports.
//!
//! linewire frames typed payloads with a plain-text header, correlates
//! responses to requests by message id, and can hand large payloads over as
//! spool files instead of inline bytes.
//!
//! # Crate Structure
//!
//! - [`transport`]: transport traits, Unix domain sockets, in-memory transports
//! - [`codec`]: the typed value format, field index and spool storage
//! - [`frame`]: frame header encoding, the streaming assembler and writer
//! - [`client`]: contexts, correlation, handler dispatch and the client

/// Re-export transport types.
pub mod transport {
    pub use linewire_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use linewire_codec::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linewire_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use linewire_client::*;
}

pub use linewire_client::{Client, ClientBuilder, ClientConfig, Context, ContextError, HookKind};
pub use linewire_codec::Value;
pub use linewire_frame::MsgMode;
