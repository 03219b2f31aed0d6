//! Request/response correlation and dispatch for linewire peers.
//!
//! A [`Client`] owns one transport connection at a time and:
//! - sends requests and resolves each [`PendingResponse`] when the frame
//!   with the same message id comes back
//! - dispatches incoming requests to the handler registered for their command
//! - runs the open and close hooks as the connection changes state
//!
//! Every frame on either side is wrapped in a [`Context`] that gives lazy,
//! random access to the payload fields and owns the payload's lifecycle.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod pending;
pub mod registry;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use context::{new_msg_id, Context};
pub use error::{ContextError, Result};
pub use pending::PendingResponse;
pub use registry::{BoxError, Handler, Hook, HookKind};
