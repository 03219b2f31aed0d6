//! One frame on one side of the wire, with its lifecycle.
//!
//! A context is created when a payload is encoded for sending, or when the
//! assembler emits an incoming frame. Its fields are indexed lazily on first
//! access. Destroying a context is idempotent and never fails: it drops the
//! correlation entry, deletes the spool file, destroys the child response and,
//! for an incoming request nobody answered, sends a void acknowledgement.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use linewire_codec::{
    decode, decode_file, encode, encode_to_spool, from_value, to_value, FieldIndex, FieldInfo,
    Storage, Value,
};
use linewire_frame::{Frame, MsgMode, Payload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::Shared;
use crate::error::{ContextError, Result};

/// Generate a fresh message id: a v4 UUID followed by the unix time in ms.
pub fn new_msg_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}{}", uuid::Uuid::new_v4(), millis)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Outgoing,
    Incoming,
}

struct Inner {
    cmd: String,
    msg_id: String,
    mode: MsgMode,
    origin: Origin,
    payload: Option<Payload>,
    index: Option<FieldIndex>,
    error: Option<ContextError>,
    child: Option<Context>,
    replied: bool,
    destroyed: bool,
    shared: Weak<Shared>,
    storage: Arc<dyn Storage>,
}

impl Inner {
    fn index(&mut self) -> Result<&FieldIndex> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.destroyed {
            return Err(ContextError::Destroyed);
        }
        if self.index.is_none() {
            let payload = self.payload.as_ref().ok_or(ContextError::Destroyed)?;
            match payload.index(self.storage.as_ref()) {
                Ok(index) => self.index = Some(index),
                Err(err) => {
                    let err = ContextError::from(err);
                    self.error = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.index.as_ref().ok_or(ContextError::Destroyed)
    }

    fn is_request(&self) -> bool {
        !self.cmd.is_empty()
    }
}

/// Shared handle to one frame's context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Mutex<Inner>>,
}

impl Context {
    /// Encode `value` (void when `None`) for sending.
    ///
    /// Encoding failures are kept as the context's error and reported when
    /// the context is sent.
    pub(crate) fn outgoing(
        cmd: &str,
        mode: MsgMode,
        value: Option<&Value>,
        shared: &Arc<Shared>,
    ) -> Self {
        let storage = shared.storage();
        let value = value.unwrap_or(&Value::Void);
        let (payload, error) = match encode_payload(value, mode, storage.as_ref()) {
            Ok(payload) => (Some(payload), None),
            Err(err) => (None, Some(err)),
        };
        Self::from_inner(Inner {
            cmd: cmd.to_string(),
            msg_id: new_msg_id(),
            mode,
            origin: Origin::Outgoing,
            payload,
            index: None,
            error,
            child: None,
            replied: false,
            destroyed: false,
            shared: Arc::downgrade(shared),
            storage,
        })
    }

    pub(crate) fn incoming(frame: Frame, shared: &Arc<Shared>) -> Self {
        Self::from_inner(Inner {
            mode: frame.mode(),
            cmd: frame.cmd,
            msg_id: frame.msg_id,
            origin: Origin::Incoming,
            payload: Some(frame.payload),
            index: None,
            error: None,
            child: None,
            replied: false,
            destroyed: false,
            shared: Arc::downgrade(shared),
            storage: shared.storage(),
        })
    }

    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Command name; empty for responses.
    pub fn cmd(&self) -> String {
        self.lock().cmd.clone()
    }

    pub fn msg_id(&self) -> String {
        self.lock().msg_id.clone()
    }

    pub fn mode(&self) -> MsgMode {
        self.lock().mode
    }

    pub fn is_response(&self) -> bool {
        !self.lock().is_request()
    }

    /// Whether this context came from the peer.
    pub fn is_incoming(&self) -> bool {
        self.lock().origin == Origin::Incoming
    }

    /// The frame payload, until the context is destroyed.
    pub fn payload(&self) -> Option<Payload> {
        self.lock().payload.clone()
    }

    /// True for a void payload.
    pub fn is_void(&self) -> bool {
        self.lock().index().map(FieldIndex::is_void).unwrap_or(false)
    }

    /// The sticky error, or the peer's error for an error payload.
    pub fn error(&self) -> Option<ContextError> {
        match self.lock().index() {
            Ok(index) => index.remote_error().map(|(code, message)| ContextError::Remote {
                code,
                message: message.to_string(),
            }),
            Err(err) => Some(err),
        }
    }

    /// Look up a top-level field by name (or list index).
    pub fn param(&self, name: &str) -> Option<FieldInfo> {
        self.lock().index().ok()?.field(name)
    }

    /// All top-level fields in wire order.
    pub fn fields(&self) -> Vec<FieldInfo> {
        self.lock()
            .index()
            .map(FieldIndex::fields)
            .unwrap_or_default()
    }

    /// Decode the whole payload.
    pub fn decode(&self) -> Result<Value> {
        let mut inner = self.lock();
        if let Some(err) = &inner.error {
            return Err(err.clone());
        }
        let decoded = match &inner.payload {
            None => return Err(ContextError::Destroyed),
            Some(Payload::Mem(bytes)) => decode(bytes),
            Some(Payload::File(path)) => decode_file(inner.storage.as_ref(), path),
        };
        decoded.map_err(|err| {
            let err = ContextError::decoding(err);
            inner.error = Some(err.clone());
            err
        })
    }

    /// Decode the payload and project it into `T`.
    pub fn decode_to<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.decode()?;
        from_value(&value).map_err(ContextError::Decode)
    }

    /// The response received for this request, if any.
    pub fn child(&self) -> Option<Context> {
        self.lock().child.clone()
    }

    /// Attach a response, destroying the previous one.
    pub(crate) fn set_child(&self, child: Context) {
        let previous = {
            let mut inner = self.lock();
            if inner.destroyed {
                Some(child)
            } else {
                inner.child.replace(child)
            }
        };
        if let Some(previous) = previous {
            previous.destroy();
        }
    }

    /// The frame to write for this outgoing context.
    pub(crate) fn frame(&self) -> Result<Frame> {
        let inner = self.lock();
        if inner.destroyed {
            return Err(ContextError::Destroyed);
        }
        if let Some(err) = &inner.error {
            return Err(err.clone());
        }
        let payload = inner.payload.clone().ok_or(ContextError::Destroyed)?;
        Ok(Frame::new(inner.cmd.clone(), inner.msg_id.clone(), payload))
    }

    /// Answer this incoming request with `value`, in the request's mode.
    pub fn reply(&self, value: &Value) -> Result<()> {
        let (msg_id, mode, shared, storage) = {
            let mut inner = self.lock();
            if inner.destroyed {
                return Err(ContextError::Destroyed);
            }
            if inner.origin != Origin::Incoming || !inner.is_request() {
                return Err(ContextError::InvalidReply("not an incoming request"));
            }
            if inner.replied {
                return Err(ContextError::InvalidReply("already replied"));
            }
            inner.replied = true;
            (
                inner.msg_id.clone(),
                inner.mode,
                inner.shared.upgrade(),
                Arc::clone(&inner.storage),
            )
        };

        let sent = shared.ok_or(ContextError::NotConnected).and_then(|shared| {
            let payload = encode_payload(value, mode, storage.as_ref())?;
            let frame = Frame::response(msg_id, payload);
            shared.send_frame(&frame).inspect_err(|_| {
                if let Payload::File(path) = &frame.payload {
                    remove_spool(storage.as_ref(), path);
                }
            })
        });
        if sent.is_err() {
            self.lock().replied = false;
        }
        sent
    }

    /// Answer with any serializable value.
    pub fn reply_with<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let value = to_value(data).map_err(ContextError::Encode)?;
        self.reply(&value)
    }

    /// Answer with a wire error.
    pub fn reply_error(&self, code: i64, message: &str) -> Result<()> {
        self.reply(&Value::error(code, message))
    }

    /// Whether a reply has been sent for this request.
    pub fn is_replied(&self) -> bool {
        self.lock().replied
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Release everything this context holds. Safe to call more than once.
    pub fn destroy(&self) {
        let (msg_id, origin, acknowledge, spool, child, shared, storage) = {
            let mut inner = self.lock();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            let acknowledge =
                inner.origin == Origin::Incoming && inner.is_request() && !inner.replied;
            inner.replied = true;
            let spool = match &inner.payload {
                Some(Payload::File(path)) => Some(path.clone()),
                _ => None,
            };
            (
                inner.msg_id.clone(),
                inner.origin,
                acknowledge,
                spool,
                inner.child.take(),
                inner.shared.upgrade(),
                Arc::clone(&inner.storage),
            )
        };

        if origin == Origin::Outgoing {
            if let Some(shared) = &shared {
                // Dropping the entry settles its future with `Cancelled`.
                drop(shared.remove_pending(&msg_id));
            }
        }
        if let Some(path) = &spool {
            remove_spool(storage.as_ref(), path);
        }
        if let Some(child) = child {
            child.destroy();
        }
        if acknowledge {
            if let Some(shared) = &shared {
                let ack = Frame::response(msg_id.clone(), Payload::Mem(linewire_codec::encode_void()));
                if let Err(err) = shared.send_frame(&ack) {
                    debug!(msg_id = %msg_id, error = %err, "acknowledgement not sent");
                }
            }
        }

        let mut inner = self.lock();
        inner.payload = None;
        inner.index = None;
        inner.error = None;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Context")
            .field("cmd", &inner.cmd)
            .field("msg_id", &inner.msg_id)
            .field("mode", &inner.mode)
            .field("origin", &inner.origin)
            .field("destroyed", &inner.destroyed)
            .finish_non_exhaustive()
    }
}

fn encode_payload(value: &Value, mode: MsgMode, storage: &dyn Storage) -> Result<Payload> {
    match mode {
        MsgMode::Mem => encode(value)
            .map(Payload::Mem)
            .map_err(ContextError::encoding),
        MsgMode::File => encode_to_spool(value, storage)
            .map(Payload::File)
            .map_err(ContextError::encoding),
    }
}

fn remove_spool(storage: &dyn Storage, path: &std::path::Path) {
    if let Err(err) = storage.remove(path) {
        debug!(path = %path.display(), error = %err, "spool file not removed");
    }
}
