//! Random access into encoded payloads.
//!
//! [`FieldIndex::build`] makes one forward pass over an encoded payload and
//! records, for every field, its type and the absolute byte span of its
//! value. Scalars are skipped, not parsed. A [`FieldInfo`] then reads or
//! decodes a single field straight from the backing buffer or file.
//!
//! Spans:
//! - string: the raw bytes only
//! - integer, double, bool: the text, without its newline
//! - list, struct: from the count line through the last nested byte

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::cursor::LineReader;
use crate::decode::{
    check_depth, decode_body, parse_count, parse_length, read_error, read_member_type,
};
use crate::error::{CodecError, Result};
use crate::json::from_value;
use crate::value::{FieldType, Value};

/// Where an indexed payload lives.
#[derive(Clone)]
pub enum Source {
    Mem(Bytes),
    File(Arc<Mutex<File>>),
}

impl Source {
    pub fn file(file: File) -> Self {
        Source::File(Arc::new(Mutex::new(file)))
    }

    /// Read the absolute byte range `[start, end)`.
    fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        match self {
            Source::Mem(bytes) => {
                let (start, end) = (start as usize, end as usize);
                if end > bytes.len() {
                    return Err(CodecError::UnexpectedEof);
                }
                Ok(bytes.slice(start..end))
            }
            Source::File(file) => {
                let mut file = file.lock().map_err(|_| poisoned())?;
                file.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0; (end - start) as usize];
                file.read_exact(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Mem(bytes) => write!(f, "Mem({} bytes)", bytes.len()),
            Source::File(_) => f.write_str("File"),
        }
    }
}

fn poisoned() -> CodecError {
    CodecError::Io(Arc::new(std::io::Error::other("spool file lock poisoned")))
}

/// One indexed field. Immutable once built.
#[derive(Debug)]
pub struct FieldNode {
    name: String,
    value_type: FieldType,
    start: u64,
    end: u64,
    children: Vec<Arc<FieldNode>>,
}

impl FieldNode {
    fn find(&self, name: &str) -> Option<&Arc<FieldNode>> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// Index of a whole payload.
#[derive(Debug, Clone)]
pub struct FieldIndex {
    kind: FieldType,
    fields: Vec<Arc<FieldNode>>,
    remote_error: Option<(i64, String)>,
    source: Source,
}

impl FieldIndex {
    /// Index an in-memory payload.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        Self::build(Source::Mem(bytes))
    }

    /// Index a spool file. The file is kept open for field reads.
    pub fn from_file(file: File) -> Result<Self> {
        Self::build(Source::file(file))
    }

    pub fn build(source: Source) -> Result<Self> {
        let (kind, fields, remote_error) = match &source {
            Source::Mem(bytes) => scan(LineReader::new(&bytes[..]))?,
            Source::File(file) => {
                let mut file = file.lock().map_err(|_| poisoned())?;
                file.seek(SeekFrom::Start(0))?;
                scan(LineReader::new(BufReader::new(&mut *file)))?
            }
        };
        Ok(Self {
            kind,
            fields,
            remote_error,
            source,
        })
    }

    /// Top-level payload type: struct, list, void or error.
    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn is_void(&self) -> bool {
        self.kind == FieldType::Void
    }

    /// Code and message of an error payload.
    pub fn remote_error(&self) -> Option<(i64, &str)> {
        self.remote_error
            .as_ref()
            .map(|(code, message)| (*code, message.as_str()))
    }

    /// Number of top-level fields (or list elements).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a top-level field by name, or a list element by its index.
    ///
    /// The encoder never writes a name twice; if a peer does, the first
    /// occurrence wins.
    pub fn field(&self, name: &str) -> Option<FieldInfo> {
        self.fields
            .iter()
            .find(|node| node.name == name)
            .map(|node| FieldInfo::new(Arc::clone(node), self.source.clone()))
    }

    /// All top-level fields, in wire order.
    pub fn fields(&self) -> Vec<FieldInfo> {
        self.fields
            .iter()
            .map(|node| FieldInfo::new(Arc::clone(node), self.source.clone()))
            .collect()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}

type Scan = (FieldType, Vec<Arc<FieldNode>>, Option<(i64, String)>);

fn scan<R: std::io::BufRead>(mut r: LineReader<R>) -> Result<Scan> {
    let kind = FieldType::parse(&r.read_line()?)?;
    let scanned = match kind {
        FieldType::Struct | FieldType::List => {
            let node = index_value(&mut r, String::new(), kind, 1)?;
            (kind, node.children, None)
        }
        FieldType::Void => (kind, Vec::new(), None),
        FieldType::Error => (kind, Vec::new(), Some(read_error(&mut r)?)),
        scalar => return Err(CodecError::TopLevelScalar(scalar)),
    };
    r.finish()?;
    Ok(scanned)
}

fn index_value<R: std::io::BufRead>(
    r: &mut LineReader<R>,
    name: String,
    value_type: FieldType,
    depth: usize,
) -> Result<FieldNode> {
    let mut children = Vec::new();
    let (start, end) = match value_type {
        FieldType::String => {
            let len = parse_length(&r.read_line()?)?;
            let start = r.position();
            r.skip(len)?;
            (start, start + len)
        }
        FieldType::Integer | FieldType::Double | FieldType::Bool => {
            let start = r.position();
            let text = r.read_line()?;
            (start, start + text.len() as u64)
        }
        FieldType::List => {
            check_depth(depth)?;
            let start = r.position();
            let count = parse_count(&r.read_line()?)?;
            if count > 0 {
                let element = read_member_type(r)?;
                for index in 0..count {
                    children.push(Arc::new(index_value(r, index.to_string(), element, depth + 1)?));
                }
            }
            (start, r.position())
        }
        FieldType::Struct => {
            check_depth(depth)?;
            let start = r.position();
            let count = parse_count(&r.read_line()?)?;
            for _ in 0..count {
                let field_name = r.read_line()?;
                let field_type = read_member_type(r)?;
                children.push(Arc::new(index_value(r, field_name, field_type, depth + 1)?));
            }
            (start, r.position())
        }
        FieldType::Void | FieldType::Error => {
            return Err(CodecError::UnsupportedFieldValue(value_type));
        }
    };
    Ok(FieldNode {
        name,
        value_type,
        start,
        end,
        children,
    })
}

/// A handle onto one indexed field.
///
/// Reads are relative to the field start and clamped to the field length.
/// After a failed read the handle keeps its error and every later read
/// returns empty bytes.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    node: Arc<FieldNode>,
    source: Source,
    pos: u64,
    error: Option<CodecError>,
}

impl FieldInfo {
    fn new(node: Arc<FieldNode>, source: Source) -> Self {
        Self {
            node,
            source,
            pos: 0,
            error: None,
        }
    }

    /// Field name, or the element index for list elements.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn value_type(&self) -> FieldType {
        self.node.value_type
    }

    /// Absolute start offset in the payload.
    pub fn start(&self) -> u64 {
        self.node.start
    }

    /// Absolute end offset (exclusive).
    pub fn end(&self) -> u64 {
        self.node.end
    }

    pub fn len(&self) -> u64 {
        self.node.end - self.node.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sticky error, if a read has failed.
    pub fn error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    /// Nested field by name (struct) or index (list). First occurrence wins.
    pub fn child(&self, name: &str) -> Option<FieldInfo> {
        self.node
            .find(name)
            .map(|node| FieldInfo::new(Arc::clone(node), self.source.clone()))
    }

    pub fn children(&self) -> Vec<FieldInfo> {
        self.node
            .children
            .iter()
            .map(|node| FieldInfo::new(Arc::clone(node), self.source.clone()))
            .collect()
    }

    /// Read up to `n` bytes from the handle's cursor and advance it.
    pub fn read(&mut self, n: u64) -> Bytes {
        let start = self.pos;
        let end = start.saturating_add(n).min(self.len());
        self.pos = end;
        self.fetch(start, end)
    }

    /// Bytes between two offsets relative to the field start.
    pub fn read_by_pos(&mut self, start: u64, end: u64) -> Bytes {
        let len = self.len();
        let (start, end) = (start.min(len), end.min(len));
        if start >= end {
            return Bytes::new();
        }
        self.fetch(start, end)
    }

    /// The whole span.
    pub fn read_all(&mut self) -> Bytes {
        self.fetch(0, self.len())
    }

    /// Decode the field's value.
    pub fn read_value(&mut self) -> Result<Value> {
        let span = self.read_all();
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        decode_body(self.value_type(), &span).inspect_err(|err| {
            self.error = Some(err.clone());
        })
    }

    /// Decode the field and project it into `T`.
    pub fn read_to<T: DeserializeOwned>(&mut self) -> Result<T> {
        from_value(&self.read_value()?)
    }

    fn fetch(&mut self, start: u64, end: u64) -> Bytes {
        if self.error.is_some() || start >= end {
            return Bytes::new();
        }
        match self
            .source
            .read_range(self.node.start + start, self.node.start + end)
        {
            Ok(bytes) => bytes,
            Err(err) => {
                self.error = Some(err);
                Bytes::new()
            }
        }
    }
}
