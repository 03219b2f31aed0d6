use std::sync::Arc;

use crate::error::{Result, TransportError};

/// A connected, message-oriented, reliable byte transport.
///
/// Each `send` hands one message to the peer; message boundaries are not
/// significant to linewire because frames are self-delimiting. Writes may be
/// issued from any thread, so implementations use interior mutability.
pub trait Transport: Send + Sync {
    /// Deliver one message to the peer.
    fn send(&self, data: &[u8]) -> Result<()>;

    /// Close the transport. Closing twice is not an error.
    fn close(&self) -> Result<()>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Callbacks a transport raises for the connection it carries.
///
/// All callbacks for one connection arrive from a single thread, in order.
pub trait TransportEvents: Send + Sync {
    /// The connection is open and ready for `send`.
    fn on_open(&self);

    /// The connection closed (locally or by the peer).
    fn on_close(&self);

    /// The connection hit an error. `on_close` usually follows.
    fn on_error(&self, err: TransportError);

    /// A message arrived from the peer.
    fn on_message(&self, data: &[u8]);
}

/// Opens new transports. Used for the initial connection and for reconnects.
pub trait Connector: Send + Sync {
    /// Open a transport that reports its lifecycle to `events`.
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>>;
}

impl<F> Connector for F
where
    F: Fn(Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> {
        self(events)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for Sink {
        fn send(&self, data: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoopEvents;

    impl TransportEvents for NoopEvents {
        fn on_open(&self) {}
        fn on_close(&self) {}
        fn on_error(&self, _err: TransportError) {}
        fn on_message(&self, _data: &[u8]) {}
    }

    #[test]
    fn arc_and_box_forward_to_inner() {
        let sink = Arc::new(Sink::default());
        sink.send(b"a").unwrap();
        let boxed: Box<dyn Transport> = Box::new(Arc::clone(&sink));
        boxed.send(b"b").unwrap();
        assert_eq!(*sink.sent.lock().unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(boxed.name(), "transport");
    }

    #[test]
    fn closures_are_connectors() {
        let connector = |_events: Arc<dyn TransportEvents>| -> Result<Box<dyn Transport>> {
            Ok(Box::new(Sink::default()))
        };
        let transport = connector.connect(Arc::new(NoopEvents)).unwrap();
        transport.send(b"x").unwrap();
    }
}
