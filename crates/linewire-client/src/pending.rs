use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use tokio::sync::oneshot;

use crate::context::Context;
use crate::error::{ContextError, Result};

pub(crate) type Resolver = oneshot::Sender<Result<Context>>;

/// One in-flight request.
pub(crate) struct PendingEntry {
    pub(crate) request: Context,
    pub(crate) resolver: Resolver,
}

impl PendingEntry {
    /// Settle the request. A dropped receiver is not an error.
    pub(crate) fn settle(self, outcome: Result<Context>) {
        let _ = self.resolver.send(outcome);
    }
}

/// Correlation table: message id to in-flight request.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: HashMap<String, PendingEntry>,
}

impl PendingTable {
    /// Register a request; fails if the id is already in flight.
    pub(crate) fn insert(&mut self, msg_id: &str, entry: PendingEntry) -> Result<()> {
        if self.entries.contains_key(msg_id) {
            return Err(ContextError::DuplicateMsgId(msg_id.to_string()));
        }
        self.entries.insert(msg_id.to_string(), entry);
        Ok(())
    }

    pub(crate) fn remove(&mut self, msg_id: &str) -> Option<PendingEntry> {
        self.entries.remove(msg_id)
    }

    pub(crate) fn drain(&mut self) -> Vec<PendingEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

enum State {
    Ready(Option<Result<Context>>),
    Waiting(oneshot::Receiver<Result<Context>>),
}

/// Resolves with the response context once the peer answers.
///
/// Failures known at send time resolve immediately. If the correlation entry
/// is dropped without an answer the future resolves with
/// [`ContextError::Cancelled`].
pub struct PendingResponse {
    request: Context,
    state: State,
}

impl PendingResponse {
    pub(crate) fn waiting(request: Context, rx: oneshot::Receiver<Result<Context>>) -> Self {
        Self {
            request,
            state: State::Waiting(rx),
        }
    }

    pub(crate) fn failed(request: Context, err: ContextError) -> Self {
        Self {
            request,
            state: State::Ready(Some(Err(err))),
        }
    }

    /// The request context that was sent.
    pub fn request(&self) -> &Context {
        &self.request
    }

    pub fn msg_id(&self) -> String {
        self.request.msg_id()
    }
}

impl Future for PendingResponse {
    type Output = Result<Context>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            State::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(ContextError::Cancelled)))
            }
            State::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(ContextError::Cancelled))),
        }
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("msg_id", &self.request.msg_id())
            .finish_non_exhaustive()
    }
}
