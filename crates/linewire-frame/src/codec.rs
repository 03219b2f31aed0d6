use std::fmt;
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use linewire_codec::{FieldIndex, Storage};

use crate::error::{FrameError, Result};

/// Default maximum in-memory payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default size of each payload write: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Longest header line the assembler will buffer while waiting for `\n`.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// How a frame carries its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MsgMode {
    /// The payload is in a spool file; the frame carries its path.
    File,
    /// The payload travels inline after a byte-length line.
    #[default]
    Mem,
}

impl MsgMode {
    /// Wire value: `0` for file, `1` for memory.
    pub fn wire(self) -> &'static str {
        match self {
            MsgMode::File => "0",
            MsgMode::Mem => "1",
        }
    }

    /// Parse a mode line. Anything other than `0` is memory mode.
    pub fn from_wire(line: &str) -> Self {
        if line == "0" {
            MsgMode::File
        } else {
            MsgMode::Mem
        }
    }
}

impl fmt::Display for MsgMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MsgMode::File => "file",
            MsgMode::Mem => "mem",
        })
    }
}

/// Frame payload: inline bytes or a spool file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Mem(Bytes),
    File(PathBuf),
}

impl Payload {
    pub fn mode(&self) -> MsgMode {
        match self {
            Payload::Mem(_) => MsgMode::Mem,
            Payload::File(_) => MsgMode::File,
        }
    }

    /// Index the payload, opening spool files through `storage`.
    pub fn index(&self, storage: &dyn Storage) -> Result<FieldIndex> {
        Ok(match self {
            Payload::Mem(bytes) => FieldIndex::from_bytes(bytes.clone())?,
            Payload::File(path) => FieldIndex::from_file(storage.open(path)?)?,
        })
    }
}

/// One logical message.
///
/// An empty `cmd` marks a response; anything else is a request routed by
/// command name. `msg_id` correlates a response with its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: String,
    pub msg_id: String,
    pub payload: Payload,
}

impl Frame {
    pub fn new(cmd: impl Into<String>, msg_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            cmd: cmd.into(),
            msg_id: msg_id.into(),
            payload,
        }
    }

    /// A response frame (empty command).
    pub fn response(msg_id: impl Into<String>, payload: Payload) -> Self {
        Self::new(String::new(), msg_id, payload)
    }

    pub fn is_response(&self) -> bool {
        self.cmd.is_empty()
    }

    pub fn mode(&self) -> MsgMode {
        self.payload.mode()
    }

    /// Inline payload length in bytes; `None` for file mode.
    pub fn data_len(&self) -> Option<usize> {
        match &self.payload {
            Payload::Mem(bytes) => Some(bytes.len()),
            Payload::File(_) => None,
        }
    }
}

/// Encode the three header lines: `cmd\nmsgId\nmode\n`.
pub fn encode_header(cmd: &str, msg_id: &str, mode: MsgMode, dst: &mut BytesMut) -> Result<()> {
    if cmd.contains('\n') {
        return Err(FrameError::InvalidHeader(format!(
            "command contains a newline: {cmd:?}"
        )));
    }
    if msg_id.is_empty() || msg_id.contains('\n') {
        return Err(FrameError::InvalidHeader(format!(
            "message id must be a non-empty single line: {msg_id:?}"
        )));
    }
    dst.reserve(cmd.len() + msg_id.len() + 5);
    put_line(dst, cmd.as_bytes());
    put_line(dst, msg_id.as_bytes());
    put_line(dst, mode.wire().as_bytes());
    Ok(())
}

/// Encode the line that follows the header: the path (file mode) or the
/// byte length (memory mode).
pub(crate) fn encode_payload_line(payload: &Payload, dst: &mut BytesMut) -> Result<()> {
    match payload {
        Payload::File(path) => put_line(dst, path_line(path)?.as_bytes()),
        Payload::Mem(bytes) => put_line(dst, bytes.len().to_string().as_bytes()),
    }
    Ok(())
}

/// Encode a complete frame into one buffer.
///
/// Wire format:
/// ```text
/// <cmd>\n<msgId>\n<mode>\n
///   mode 0: <filePath>\n
///   mode 1: <byteLength>\n<payload>[\n if the payload does not end with one]
/// ```
pub fn encode_frame(frame: &Frame, max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    check_payload_size(&frame.payload, max_payload)?;
    encode_header(&frame.cmd, &frame.msg_id, frame.mode(), dst)?;
    encode_payload_line(&frame.payload, dst)?;
    if let Payload::Mem(bytes) = &frame.payload {
        dst.put_slice(bytes);
        if needs_separator(bytes) {
            dst.put_u8(b'\n');
        }
    }
    Ok(())
}

pub(crate) fn check_payload_size(payload: &Payload, max: usize) -> Result<()> {
    if let Payload::Mem(bytes) = payload {
        if bytes.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: bytes.len(),
                max,
            });
        }
    }
    Ok(())
}

/// Memory payloads not ending in `\n` are followed by one separator byte.
pub(crate) fn needs_separator(payload: &[u8]) -> bool {
    payload.last() != Some(&b'\n')
}

fn path_line(path: &Path) -> Result<&str> {
    let line = path
        .to_str()
        .ok_or_else(|| FrameError::InvalidHeader(format!("non-UTF-8 path: {}", path.display())))?;
    if line.is_empty() || line.contains('\n') {
        return Err(FrameError::InvalidHeader(format!(
            "file path must be a non-empty single line: {line:?}"
        )));
    }
    Ok(line)
}

fn put_line(dst: &mut BytesMut, line: &[u8]) {
    dst.put_slice(line);
    dst.put_u8(b'\n');
}

/// Configuration for frame assembly and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum inline payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Size of each payload write. Default: 1 MiB.
    pub chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use linewire_codec::{encode, FieldType, FsStorage, MemoryStorage, Value};

    use super::*;

    fn encoded(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(frame, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_mode_wire_values() {
        assert_eq!(MsgMode::File.wire(), "0");
        assert_eq!(MsgMode::Mem.wire(), "1");
        assert_eq!(MsgMode::from_wire("0"), MsgMode::File);
        assert_eq!(MsgMode::from_wire("1"), MsgMode::Mem);
        assert_eq!(MsgMode::from_wire("2"), MsgMode::Mem);
        assert_eq!(MsgMode::from_wire(""), MsgMode::Mem);
    }

    #[test]
    fn test_mem_frame_gets_separator() {
        let frame = Frame::new("echo", "id-1", Payload::Mem(Bytes::from_static(b"7\n")));
        assert_eq!(encoded(&frame), b"echo\nid-1\n1\n2\n7\n");

        let frame = Frame::response("id-1", Payload::Mem(Bytes::from_static(b"8\n1\n1\nx")));
        assert_eq!(encoded(&frame), b"\nid-1\n1\n7\n8\n1\n1\nx\n");

        let frame = Frame::response("id-2", Payload::Mem(Bytes::new()));
        assert_eq!(encoded(&frame), b"\nid-2\n1\n0\n\n");
        assert_eq!(frame.data_len(), Some(0));
    }

    #[test]
    fn test_file_frame_carries_path() {
        let frame = Frame::new("load", "id-3", Payload::File(PathBuf::from("/tmp/spool")));
        assert_eq!(encoded(&frame), b"load\nid-3\n0\n/tmp/spool\n");
        assert_eq!(frame.mode(), MsgMode::File);
        assert_eq!(frame.data_len(), None);
    }

    #[test]
    fn test_header_validation() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_header("a\nb", "id", MsgMode::Mem, &mut buf),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(
            encode_header("a", "", MsgMode::Mem, &mut buf),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(
            encode_header("a", "x\ny", MsgMode::Mem, &mut buf),
            Err(FrameError::InvalidHeader(_))
        ));
        let frame = Frame::new("a", "id", Payload::File(PathBuf::from("bad\npath")));
        assert!(matches!(
            encode_frame(&frame, DEFAULT_MAX_PAYLOAD, &mut buf),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_payload_too_large() {
        let frame = Frame::new("a", "id", Payload::Mem(Bytes::from(vec![b'x'; 11])));
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(&frame, 10, &mut buf),
            Err(FrameError::PayloadTooLarge { size: 11, max: 10 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_index() {
        let value = Value::structure([("n", Value::from(5))]);
        let bytes = encode(&value).unwrap();
        let index = Payload::Mem(bytes.clone()).index(&MemoryStorage).unwrap();
        assert_eq!(index.kind(), FieldType::Struct);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        std::fs::write(&path, &bytes).unwrap();
        let storage = FsStorage::new(dir.path());
        let index = Payload::File(path.clone()).index(&storage).unwrap();
        assert_eq!(
            index.field("n").unwrap().read_value().unwrap(),
            Value::from(5)
        );
        assert!(matches!(
            Payload::File(path).index(&MemoryStorage),
            Err(FrameError::Codec(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = FrameConfig::default();
        assert_eq!(config.max_payload_size, 16 * 1024 * 1024);
        assert_eq!(config.chunk_size, 1024 * 1024);
    }
}
