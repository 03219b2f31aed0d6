//! Request handlers by command name, plus the connection hooks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::client::Client;
use crate::context::Context;

/// Boxed error returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handles one incoming request. The context is destroyed once it returns.
pub type Handler = Arc<dyn Fn(&Context) -> Result<(), BoxError> + Send + Sync>;

/// Called when the connection opens or closes.
pub type Hook = Arc<dyn Fn(&Client) + Send + Sync>;

/// Connection lifecycle events that accept a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Open,
    Close,
}

#[derive(Default)]
struct Hooks {
    open: Option<Hook>,
    close: Option<Hook>,
}

/// Handler table and hooks. Lookups clone the `Arc` out so no lock is held
/// while user code runs.
#[derive(Default)]
pub(crate) struct Registry {
    handlers: RwLock<HashMap<String, Handler>>,
    hooks: RwLock<Hooks>,
}

impl Registry {
    pub(crate) fn register(&self, cmd: &str, handler: Handler) -> Option<Handler> {
        write(&self.handlers).insert(cmd.to_string(), handler)
    }

    pub(crate) fn unregister(&self, cmd: &str) -> Option<Handler> {
        write(&self.handlers).remove(cmd)
    }

    pub(crate) fn handler(&self, cmd: &str) -> Option<Handler> {
        read(&self.handlers).get(cmd).cloned()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        let mut commands: Vec<_> = read(&self.handlers).keys().cloned().collect();
        commands.sort();
        commands
    }

    /// Install a hook, replacing any previous one for the same event.
    pub(crate) fn set_hook(&self, kind: HookKind, hook: Option<Hook>) {
        let mut hooks = write(&self.hooks);
        match kind {
            HookKind::Open => hooks.open = hook,
            HookKind::Close => hooks.close = hook,
        }
    }

    pub(crate) fn hook(&self, kind: HookKind) -> Option<Hook> {
        let hooks = read(&self.hooks);
        match kind {
            HookKind::Open => hooks.open.clone(),
            HookKind::Close => hooks.close.clone(),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
