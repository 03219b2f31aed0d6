use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport, TransportEvents};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Client-side connector for a Unix domain socket path.
///
/// Every `connect` opens a fresh stream, so the same connector serves
/// reconnects.
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The socket path this connector dials.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixSocketConnector {
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> {
        let stream = UnixStream::connect(&self.path).map_err(|e| TransportError::Connect {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = ?self.path, "connected to unix domain socket");
        let transport = spawn_connection(stream, events)?;
        Ok(Box::new(transport))
    }
}

/// Listening side of a Unix domain socket.
///
/// Accepted streams are handed out as single-use [`AcceptedConnector`]s so a
/// server-side client runs through the same lifecycle as a dialing one.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixSocketListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket left at `path` is removed first; any other kind of file
    /// is left alone and the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit socket file mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Accept the next incoming connection (blocking).
    pub fn accept(&self) -> Result<AcceptedConnector> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(AcceptedConnector {
            stream: Mutex::new(Some(stream)),
        })
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata)
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino =>
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
            Err(_) => {}
        }
    }
}

/// Connector wrapping one already-accepted stream.
///
/// The first `connect` adopts the stream; later calls fail with
/// [`TransportError::Shutdown`] because an accepted peer cannot be redialed.
#[derive(Debug)]
pub struct AcceptedConnector {
    stream: Mutex<Option<UnixStream>>,
}

impl Connector for AcceptedConnector {
    fn connect(&self, events: Arc<dyn TransportEvents>) -> Result<Box<dyn Transport>> {
        let stream = self
            .stream
            .lock()
            .map_err(|_| TransportError::Shutdown)?
            .take()
            .ok_or(TransportError::Shutdown)?;
        let transport = spawn_connection(stream, events)?;
        Ok(Box::new(transport))
    }
}

/// A connected Unix domain socket carrying linewire messages.
#[derive(Debug)]
pub struct UnixSocketTransport {
    stream: UnixStream,
    closed: AtomicBool,
}

impl Transport for UnixSocketTransport {
    fn send(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        let mut stream = &self.stream;
        loop {
            match stream.write_all(data) {
                Ok(()) => return stream.flush().map_err(Into::into),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

/// Raise `on_open`, then start the reader thread that feeds `on_message`.
fn spawn_connection(
    stream: UnixStream,
    events: Arc<dyn TransportEvents>,
) -> Result<UnixSocketTransport> {
    let mut reader = stream.try_clone()?;
    events.on_open();

    std::thread::Builder::new()
        .name("linewire-uds-reader".to_string())
        .spawn(move || {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => events.on_message(&chunk[..n]),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        events.on_error(TransportError::Io(err));
                        break;
                    }
                }
            }
            debug!("unix socket reader finished");
            events.on_close();
        })?;

    Ok(UnixSocketTransport {
        stream,
        closed: AtomicBool::new(false),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    enum Event {
        Open,
        Close,
        Error,
        Message(Vec<u8>),
    }

    struct ChannelEvents(Mutex<mpsc::Sender<Event>>);

    impl TransportEvents for ChannelEvents {
        fn on_open(&self) {
            let _ = self.0.lock().unwrap().send(Event::Open);
        }
        fn on_close(&self) {
            let _ = self.0.lock().unwrap().send(Event::Close);
        }
        fn on_error(&self, _err: TransportError) {
            let _ = self.0.lock().unwrap().send(Event::Error);
        }
        fn on_message(&self, data: &[u8]) {
            let _ = self.0.lock().unwrap().send(Event::Message(data.to_vec()));
        }
    }

    fn channel_events() -> (Arc<dyn TransportEvents>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(ChannelEvents(Mutex::new(tx))), rx)
    }

    fn collect_until_close(rx: &mpsc::Receiver<Event>) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("event expected") {
                Event::Message(data) => out.extend_from_slice(&data),
                Event::Close => return out,
                Event::Open | Event::Error => {}
            }
        }
    }

    #[test]
    fn connect_send_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("lw.sock");
        let listener = UnixSocketListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let (client_events, _client_rx) = channel_events();
        let client = UnixSocketConnector::new(&sock_path)
            .connect(client_events)
            .unwrap();

        let accepted = listener.accept().unwrap();
        let (server_events, server_rx) = channel_events();
        let server = accepted.connect(server_events).unwrap();
        assert!(matches!(server_rx.recv().unwrap(), Event::Open));

        client.send(b"hello ").unwrap();
        client.send(b"world").unwrap();
        client.close().unwrap();
        client.close().unwrap();

        assert_eq!(collect_until_close(&server_rx), b"hello world");
        assert_eq!(server.name(), "unix-domain-socket");
        assert!(matches!(client.send(b"late"), Err(TransportError::Shutdown)));
    }

    #[test]
    fn accepted_connector_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("once.sock");
        let listener = UnixSocketListener::bind(&sock_path).unwrap();

        let (client_events, _client_rx) = channel_events();
        let _client = UnixSocketConnector::new(&sock_path)
            .connect(client_events)
            .unwrap();

        let accepted = listener.accept().unwrap();
        let (events, _rx) = channel_events();
        let _server = accepted.connect(Arc::clone(&events)).unwrap();
        assert!(matches!(
            accepted.connect(events),
            Err(TransportError::Shutdown)
        ));
    }

    #[test]
    fn connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (events, _rx) = channel_events();
        let result = UnixSocketConnector::new(dir.path().join("missing.sock")).connect(events);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixSocketListener::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn bind_default_permissions_hardened() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("perm.sock");

        let listener = UnixSocketListener::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be cleaned up on drop");
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixSocketListener::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("drop.sock");

        let listener = UnixSocketListener::bind(&sock_path).unwrap();
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );
    }
}
