//! In-process transports.
//!
//! - [`recording`] captures every write and lets the caller inject events by
//!   hand; it drives deterministic unit tests of the client.
//! - [`pair`] links two endpoints; each direction is delivered by its own
//!   thread, the way a socket reader would.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport, TransportEvents};

#[derive(Default)]
struct RecordingState {
    sent: Mutex<Vec<Bytes>>,
    events: Mutex<Option<Arc<dyn TransportEvents>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    fail_sends: AtomicBool,
    fail_connects: AtomicBool,
    manual_open: AtomicBool,
}

/// Create a recording connector and the handle that observes it.
pub fn recording() -> (RecordingConnector, RecordingHandle) {
    let state = Arc::new(RecordingState::default());
    (
        RecordingConnector {
            state: Arc::clone(&state),
        },
        RecordingHandle { state },
    )
}

/// Connector half of [`recording`].
pub struct RecordingConnector {
    state: Arc<RecordingState>,
}

impl Connector for RecordingConnector {
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> {
        if self.state.fail_connects.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        self.state.connects.fetch_add(1, Ordering::AcqRel);
        *lock(&self.state.events) = Some(Arc::clone(&events));
        if !self.state.manual_open.load(Ordering::Acquire) {
            events.on_open();
        }
        Ok(Box::new(RecordingTransport {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct RecordingTransport {
    state: Arc<RecordingState>,
    closed: AtomicBool,
}

impl Transport for RecordingTransport {
    fn send(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        if self.state.fail_sends.load(Ordering::Acquire) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "recording transport configured to fail",
            )));
        }
        lock(&self.state.sent).push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.closes.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory-recording"
    }
}

/// Observer half of [`recording`]: inspects writes and injects events.
#[derive(Clone)]
pub struct RecordingHandle {
    state: Arc<RecordingState>,
}

impl RecordingHandle {
    /// Every message written so far, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.state.sent).clone()
    }

    /// All written bytes concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.state.sent)
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    /// Drain the recorded writes.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *lock(&self.state.sent))
    }

    /// Number of successful `connect` calls.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::Acquire)
    }

    /// Number of transports closed through `Transport::close`.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::Acquire)
    }

    /// Make subsequent writes fail with a broken pipe.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::Release);
    }

    /// Make subsequent connects fail.
    pub fn set_fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::Release);
    }

    /// Suppress the automatic `on_open` raised by `connect`.
    pub fn set_manual_open(&self, manual: bool) {
        self.state.manual_open.store(manual, Ordering::Release);
    }

    /// Raise `on_open` on the latest connection.
    pub fn open(&self) {
        if let Some(events) = self.events() {
            events.on_open();
        }
    }

    /// Deliver `data` to the latest connection as one message.
    pub fn deliver(&self, data: &[u8]) {
        if let Some(events) = self.events() {
            events.on_message(data);
        }
    }

    /// Raise `on_error` on the latest connection.
    pub fn fail(&self, err: TransportError) {
        if let Some(events) = self.events() {
            events.on_error(err);
        }
    }

    /// Raise `on_close` on the latest connection.
    pub fn close(&self) {
        if let Some(events) = self.events() {
            events.on_close();
        }
    }

    fn events(&self) -> Option<Arc<dyn TransportEvents>> {
        lock(&self.state.events).clone()
    }
}

type Inbox = Option<mpsc::Sender<Bytes>>;

/// Create two linked in-process endpoints.
pub fn pair() -> (PairConnector, PairConnector) {
    let inboxes: Arc<Mutex<[Inbox; 2]>> = Arc::new(Mutex::new([None, None]));
    (
        PairConnector {
            side: 0,
            inboxes: Arc::clone(&inboxes),
        },
        PairConnector { side: 1, inboxes },
    )
}

/// One endpoint of [`pair`].
pub struct PairConnector {
    side: usize,
    inboxes: Arc<Mutex<[Inbox; 2]>>,
}

impl Connector for PairConnector {
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> {
        let (tx, rx) = mpsc::channel::<Bytes>();
        lock(&self.inboxes)[self.side] = Some(tx);
        events.on_open();

        let side = self.side;
        std::thread::Builder::new()
            .name(format!("linewire-pair-{side}"))
            .spawn(move || {
                for message in rx {
                    events.on_message(&message);
                }
                debug!(side, "pair endpoint closed");
                events.on_close();
            })?;

        Ok(Box::new(PairTransport {
            peer: 1 - self.side,
            inboxes: Arc::clone(&self.inboxes),
        }))
    }
}

struct PairTransport {
    peer: usize,
    inboxes: Arc<Mutex<[Inbox; 2]>>,
}

impl Transport for PairTransport {
    fn send(&self, data: &[u8]) -> Result<()> {
        let inbox = lock(&self.inboxes)[self.peer]
            .clone()
            .ok_or(TransportError::NotConnected)?;
        inbox
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&self) -> Result<()> {
        let mut inboxes = lock(&self.inboxes);
        inboxes[0] = None;
        inboxes[1] = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory-pair"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Collect {
        opened: AtomicUsize,
        closed: AtomicUsize,
        data: Mutex<Vec<u8>>,
        tx: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl TransportEvents for Collect {
        fn on_open(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
        fn on_close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = self.tx.lock().unwrap().as_ref() {
                let _ = tx.send(());
            }
        }
        fn on_error(&self, _err: TransportError) {}
        fn on_message(&self, data: &[u8]) {
            self.data.lock().unwrap().extend_from_slice(data);
        }
    }

    #[test]
    fn recording_captures_writes_and_injects_events() {
        let (connector, handle) = recording();
        let events = Arc::new(Collect::default());
        let transport = connector.connect(events.clone()).unwrap();
        assert_eq!(events.opened.load(Ordering::SeqCst), 1);

        transport.send(b"ab").unwrap();
        transport.send(b"c").unwrap();
        assert_eq!(handle.sent_bytes(), b"abc");
        assert_eq!(handle.take_sent().len(), 2);
        assert!(handle.sent().is_empty());

        handle.deliver(b"inbound");
        handle.close();
        assert_eq!(&*events.data.lock().unwrap(), b"inbound");
        assert_eq!(events.closed.load(Ordering::SeqCst), 1);

        handle.set_fail_sends(true);
        assert!(transport.send(b"x").is_err());

        transport.close().unwrap();
        transport.close().unwrap();
        assert_eq!(handle.closes(), 1);
        assert_eq!(handle.connects(), 1);
    }

    #[test]
    fn recording_manual_open_and_failed_connect() {
        let (connector, handle) = recording();
        handle.set_manual_open(true);
        let events = Arc::new(Collect::default());
        let _transport = connector.connect(events.clone()).unwrap();
        assert_eq!(events.opened.load(Ordering::SeqCst), 0);
        handle.open();
        assert_eq!(events.opened.load(Ordering::SeqCst), 1);

        handle.set_fail_connects(true);
        assert!(connector.connect(events).is_err());
        assert_eq!(handle.connects(), 1);
    }

    #[test]
    fn pair_delivers_in_both_directions() {
        let (left, right) = pair();
        let (done_tx, done_rx) = mpsc::channel();
        let left_events = Arc::new(Collect::default());
        let right_events = Arc::new(Collect {
            tx: Mutex::new(Some(done_tx)),
            ..Collect::default()
        });

        let left_transport = left.connect(left_events.clone()).unwrap();
        let right_transport = right.connect(right_events.clone()).unwrap();

        left_transport.send(b"ping").unwrap();
        right_transport.send(b"pong").unwrap();
        left_transport.close().unwrap();

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(&*right_events.data.lock().unwrap(), b"ping");
        assert!(matches!(
            right_transport.send(b"late"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn pair_send_before_peer_connects_fails() {
        let (left, _right) = pair();
        let transport = left.connect(Arc::new(Collect::default())).unwrap();
        assert!(matches!(
            transport.send(b"early"),
            Err(TransportError::NotConnected)
        ));
    }
}
