use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use linewire_codec::{to_value, FsStorage, Storage, Value};
use linewire_frame::{Frame, FrameAssembler, FrameWriter, MsgMode};
use linewire_transport::{Connector, Transport, TransportError, TransportEvents};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::{ContextError, Result};
use crate::pending::{PendingEntry, PendingResponse, PendingTable};
use crate::registry::{BoxError, Handler, Hook, HookKind, Registry};

struct Connection {
    transport: Option<Arc<dyn Transport>>,
    is_open: bool,
    last_error: Option<Arc<TransportError>>,
    // Bumped on every (re)connect; events tagged with an older value are stale.
    generation: u64,
    open_hook_fired: bool,
    assembler: FrameAssembler,
}

/// State shared by every clone of a [`Client`] and by its contexts.
pub(crate) struct Shared {
    connector: Box<dyn Connector>,
    config: ClientConfig,
    storage: Arc<dyn Storage>,
    conn: Mutex<Connection>,
    pending: Mutex<PendingTable>,
    registry: Registry,
    // Serializes whole frames on the transport.
    write_lock: Mutex<()>,
}

impl Shared {
    pub(crate) fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        lock(&self.pending)
    }

    pub(crate) fn remove_pending(&self, msg_id: &str) -> Option<PendingEntry> {
        self.pending().remove(msg_id)
    }

    /// The transport, if it is open.
    fn open_transport(&self) -> Option<Arc<dyn Transport>> {
        let conn = self.conn();
        if conn.is_open {
            conn.transport.clone()
        } else {
            None
        }
    }

    /// Write one frame on the open transport.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<()> {
        let transport = self.open_transport().ok_or(ContextError::NotConnected)?;
        self.write_frame(transport.as_ref(), frame)
    }

    fn write_frame(&self, transport: &dyn Transport, frame: &Frame) -> Result<()> {
        let _guard = lock(&self.write_lock);
        FrameWriter::with_config(transport, self.config.frame.clone())
            .write_frame(frame)
            .map_err(ContextError::from)
    }

    fn run_hook(self: &Arc<Self>, kind: HookKind) {
        if let Some(hook) = self.registry.hook(kind) {
            hook(&Client {
                shared: Arc::clone(self),
            });
        }
    }

    fn handle_open(self: &Arc<Self>, generation: u64) {
        let fire = {
            let mut conn = self.conn();
            if conn.generation != generation {
                return;
            }
            conn.is_open = true;
            conn.last_error = None;
            take_open_hook(&mut conn)
        };
        info!(generation, "connection open");
        if fire {
            self.run_hook(HookKind::Open);
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64) {
        {
            let mut conn = self.conn();
            if conn.generation != generation {
                return;
            }
            conn.is_open = false;
        }
        info!(generation, "connection closed");
        self.run_hook(HookKind::Close);
    }

    fn handle_error(&self, generation: u64, err: TransportError) {
        let mut conn = self.conn();
        if conn.generation != generation {
            return;
        }
        warn!(generation, error = %err, "transport error");
        conn.is_open = false;
        conn.last_error = Some(Arc::new(err));
    }

    fn handle_message(self: &Arc<Self>, generation: u64, data: &[u8]) {
        let frames = {
            let mut conn = self.conn();
            if conn.generation != generation {
                return;
            }
            match conn.assembler.push(data) {
                Ok(frames) => frames,
                Err(err) => {
                    warn!(error = %err, "dropping malformed frame data");
                    return;
                }
            }
        };
        for frame in frames {
            self.dispatch(frame);
        }
    }

    fn dispatch(self: &Arc<Self>, frame: Frame) {
        let ctx = Context::incoming(frame, self);
        let msg_id = ctx.msg_id();

        if ctx.is_response() {
            match self.remove_pending(&msg_id) {
                Some(entry) => {
                    debug!(msg_id = %msg_id, "response matched");
                    entry.request.set_child(ctx.clone());
                    entry.settle(Ok(ctx));
                }
                None => {
                    debug!(msg_id = %msg_id, "no pending request for response");
                    ctx.destroy();
                }
            }
            return;
        }

        let cmd = ctx.cmd();
        match self.registry.handler(&cmd) {
            Some(handler) => {
                debug!(cmd = %cmd, msg_id = %msg_id, "dispatching request");
                match panic::catch_unwind(AssertUnwindSafe(|| handler(&ctx))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(cmd = %cmd, msg_id = %msg_id, error = %err, "handler failed");
                    }
                    Err(payload) => {
                        error!(
                            cmd = %cmd,
                            msg_id = %msg_id,
                            panic = panic_message(payload.as_ref()),
                            "handler panicked"
                        );
                    }
                }
            }
            None => debug!(cmd = %cmd, msg_id = %msg_id, "no handler for command"),
        }
        ctx.destroy();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Fire the open hook once per connection, once the transport is both open
/// and stored.
fn take_open_hook(conn: &mut Connection) -> bool {
    if conn.is_open && conn.transport.is_some() && !conn.open_hook_fired {
        conn.open_hook_fired = true;
        true
    } else {
        false
    }
}

/// Routes transport callbacks for one connection generation.
struct Events {
    shared: Weak<Shared>,
    generation: u64,
}

impl TransportEvents for Events {
    fn on_open(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_open(self.generation);
        }
    }

    fn on_close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_close(self.generation);
        }
    }

    fn on_error(&self, err: TransportError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_error(self.generation, err);
        }
    }

    fn on_message(&self, data: &[u8]) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_message(self.generation, data);
        }
    }
}

/// Builds a [`Client`].
pub struct ClientBuilder {
    connector: Box<dyn Connector>,
    config: ClientConfig,
    storage: Option<Arc<dyn Storage>>,
}

impl ClientBuilder {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            config: ClientConfig::default(),
            storage: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Spool storage for file-mode payloads. Default: [`FsStorage::default`].
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn build(self) -> Client {
        let assembler = FrameAssembler::with_config(self.config.frame.clone());
        Client {
            shared: Arc::new(Shared {
                connector: self.connector,
                storage: self
                    .storage
                    .unwrap_or_else(|| Arc::new(FsStorage::default())),
                config: self.config,
                conn: Mutex::new(Connection {
                    transport: None,
                    is_open: false,
                    last_error: None,
                    generation: 0,
                    open_hook_fired: false,
                    assembler,
                }),
                pending: Mutex::new(PendingTable::default()),
                registry: Registry::default(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Build the client and open its first connection.
    pub fn connect(self) -> Result<Client> {
        let client = self.build();
        client.get_connection()?;
        Ok(client)
    }
}

/// A linewire peer: sends requests, matches responses and dispatches
/// incoming requests to handlers.
///
/// Cloning is cheap; every clone drives the same connection.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// A client with default configuration and filesystem spooling.
    pub fn new(connector: impl Connector + 'static) -> Self {
        ClientBuilder::new(connector).build()
    }

    pub fn builder(connector: impl Connector + 'static) -> ClientBuilder {
        ClientBuilder::new(connector)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The current transport, connecting first if there is none and
    /// reconnecting if the last one failed.
    pub fn get_connection(&self) -> Result<Arc<dyn Transport>> {
        {
            let conn = self.shared.conn();
            if let (Some(transport), None) = (&conn.transport, &conn.last_error) {
                return Ok(Arc::clone(transport));
            }
        }
        self.reconnect()
    }

    /// Close the current transport (if any) and open a new one.
    ///
    /// Pending requests are neither resent nor failed.
    pub fn reconnect(&self) -> Result<Arc<dyn Transport>> {
        let (old, generation) = {
            let mut conn = self.shared.conn();
            conn.generation += 1;
            conn.is_open = false;
            conn.last_error = None;
            conn.open_hook_fired = false;
            conn.assembler.reset();
            (conn.transport.take(), conn.generation)
        };
        if let Some(old) = old {
            if let Err(err) = old.close() {
                debug!(error = %err, "closing previous transport failed");
            }
        }

        let events = Arc::new(Events {
            shared: Arc::downgrade(&self.shared),
            generation,
        });
        let transport: Arc<dyn Transport> = match self.shared.connector.connect(events) {
            Ok(transport) => Arc::from(transport),
            Err(err) => {
                warn!(generation, error = %err, "connect failed");
                let err = Arc::new(err);
                let mut conn = self.shared.conn();
                if conn.generation == generation {
                    conn.last_error = Some(Arc::clone(&err));
                }
                return Err(ContextError::Transport(err));
            }
        };

        let fire = {
            let mut conn = self.shared.conn();
            if conn.generation != generation {
                // A newer reconnect won the race.
                drop(conn);
                let _ = transport.close();
                return Err(ContextError::Cancelled);
            }
            conn.transport = Some(Arc::clone(&transport));
            take_open_hook(&mut conn)
        };
        info!(generation, transport = transport.name(), "connected");
        if fire {
            self.shared.run_hook(HookKind::Open);
        }
        Ok(transport)
    }

    /// Close the transport. The close hook runs when the transport reports it.
    pub fn close(&self) -> Result<()> {
        let transport = {
            let mut conn = self.shared.conn();
            conn.is_open = false;
            conn.transport.take()
        };
        match transport {
            Some(transport) => Ok(transport.close()?),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.conn().is_open
    }

    /// The error reported by the current transport, if any.
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        self.shared.conn().last_error.clone()
    }

    /// Register the handler for `cmd`, returning the one it replaces.
    pub fn register<F>(&self, cmd: &str, handler: F) -> Option<Handler>
    where
        F: Fn(&Context) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.shared.registry.register(cmd, Arc::new(handler))
    }

    /// Register a handler that takes and returns serde types.
    ///
    /// The request payload is projected into `T`; the returned `R` is sent
    /// back as the reply.
    pub fn register_typed<T, R, F>(&self, cmd: &str, handler: F) -> Option<Handler>
    where
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(T) -> std::result::Result<R, BoxError> + Send + Sync + 'static,
    {
        self.register(cmd, move |ctx: &Context| {
            let request: T = ctx.decode_to()?;
            let response = handler(request)?;
            ctx.reply_with(&response)?;
            Ok(())
        })
    }

    pub fn unregister(&self, cmd: &str) -> Option<Handler> {
        self.shared.registry.unregister(cmd)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.shared.registry.commands()
    }

    /// Install the open or close hook, replacing the previous one.
    pub fn on<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&Client) + Send + Sync + 'static,
    {
        let hook: Hook = Arc::new(hook);
        self.shared.registry.set_hook(kind, Some(hook));
    }

    pub fn remove_hook(&self, kind: HookKind) {
        self.shared.registry.set_hook(kind, None);
    }

    /// Encode an outgoing request without sending it.
    pub fn context(&self, cmd: &str, mode: MsgMode, value: Option<&Value>) -> Context {
        Context::outgoing(cmd, mode, value, &self.shared)
    }

    /// Send `value` as a `cmd` request in the default mode.
    pub fn send(&self, cmd: &str, value: &Value) -> PendingResponse {
        self.send_with_mode(cmd, self.shared.config.default_mode, Some(value))
    }

    /// Send a request in an explicit mode; `None` sends a void payload.
    pub fn send_with_mode(&self, cmd: &str, mode: MsgMode, value: Option<&Value>) -> PendingResponse {
        let ctx = self.context(cmd, mode, value);
        self.send_context(&ctx)
    }

    /// Send any serializable value as a `cmd` request.
    pub fn send_serialized<T: Serialize + ?Sized>(&self, cmd: &str, data: &T) -> PendingResponse {
        match to_value(data) {
            Ok(value) => self.send(cmd, &value),
            Err(err) => {
                let ctx = self.context(cmd, self.shared.config.default_mode, None);
                PendingResponse::failed(ctx, ContextError::Encode(err))
            }
        }
    }

    /// Register `ctx` for its response and write it.
    pub fn send_context(&self, ctx: &Context) -> PendingResponse {
        let frame = match ctx.frame() {
            Ok(frame) => frame,
            Err(err) => return PendingResponse::failed(ctx.clone(), err),
        };
        let Some(transport) = self.shared.open_transport() else {
            return PendingResponse::failed(ctx.clone(), ContextError::NotConnected);
        };

        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            request: ctx.clone(),
            resolver: tx,
        };
        if let Err(err) = self.shared.pending().insert(&frame.msg_id, entry) {
            return PendingResponse::failed(ctx.clone(), err);
        }

        debug!(cmd = %frame.cmd, msg_id = %frame.msg_id, mode = %frame.mode(), "sending request");
        if let Err(err) = self.shared.write_frame(transport.as_ref(), &frame) {
            warn!(msg_id = %frame.msg_id, error = %err, "request write failed");
            if let Some(entry) = self.shared.remove_pending(&frame.msg_id) {
                entry.settle(Err(err));
            }
            if let linewire_frame::Payload::File(path) = &frame.payload {
                if let Err(err) = self.shared.storage.remove(path) {
                    debug!(path = %path.display(), error = %err, "spool file not removed");
                }
            }
        }
        PendingResponse::waiting(ctx.clone(), rx)
    }

    /// Drop the correlation entry for `msg_id`; its future resolves with
    /// [`ContextError::Cancelled`].
    pub fn remove_pending(&self, msg_id: &str) -> bool {
        self.shared.remove_pending(msg_id).is_some()
    }

    /// Drop every correlation entry. Returns how many were dropped.
    pub fn clear_pending(&self) -> usize {
        let entries = self.shared.pending().drain();
        entries.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("is_open", &self.is_open())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
