//! Message-oriented transport abstraction for linewire.
//!
//! A linewire peer only needs a connected, reliable byte pipe that hands it
//! whole messages and reports open / close / error. This crate defines that
//! contract and ships the transports linewire uses:
//! - Unix domain sockets (client connector and accepting listener)
//! - In-process transports for tests ([`memory`])
//!
//! This is the lowest layer of linewire. Framing and request correlation
//! build on the [`Transport`] and [`Connector`] traits provided here.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{Connector, Transport, TransportEvents};

#[cfg(unix)]
pub use uds::{AcceptedConnector, UnixSocketConnector, UnixSocketListener, UnixSocketTransport};
