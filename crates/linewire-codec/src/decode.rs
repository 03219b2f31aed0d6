use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::cursor::LineReader;
use crate::error::{CodecError, Result};
use crate::storage::Storage;
use crate::value::{FieldType, Value};

// Cap on speculative allocation from a count line.
const MAX_PREALLOC: usize = 1024;

/// Deepest nesting of lists and structs accepted by the codec. The top-level
/// container is depth 1.
pub const MAX_DEPTH: usize = 128;

/// Decode a complete in-memory payload.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    decode_from(bytes)
}

/// Decode a complete payload from a buffered reader.
///
/// Bytes left over after the top-level value are an error.
pub fn decode_from<R: BufRead>(reader: R) -> Result<Value> {
    let mut r = LineReader::new(reader);
    let value = read_top(&mut r)?;
    r.finish()?;
    Ok(value)
}

/// Decode a spool file.
pub fn decode_file(storage: &dyn Storage, path: &Path) -> Result<Value> {
    let file = storage.open(path)?;
    decode_from(BufReader::new(file))
}

/// Decode the span of a field whose type is already known.
///
/// Spans are the ones recorded by the field index: raw bytes for strings,
/// the bare text for integers, doubles and bools, and everything from the
/// count line onwards for lists and structs.
pub fn decode_body(kind: FieldType, span: &[u8]) -> Result<Value> {
    match kind {
        FieldType::String => std::str::from_utf8(span)
            .map(|s| Value::String(s.to_string()))
            .map_err(|_| CodecError::InvalidUtf8("string")),
        FieldType::Integer | FieldType::Double | FieldType::Bool => {
            let text = std::str::from_utf8(span).map_err(|_| CodecError::InvalidUtf8("line"))?;
            parse_scalar(kind, text.strip_suffix('\n').unwrap_or(text))
        }
        FieldType::List | FieldType::Struct => {
            let mut r = LineReader::new(span);
            let value = read_body(kind, &mut r)?;
            r.finish()?;
            Ok(value)
        }
        FieldType::Void | FieldType::Error => Err(CodecError::UnsupportedFieldValue(kind)),
    }
}

/// Read a top-level value: tag line, then body.
pub(crate) fn read_top<R: BufRead>(r: &mut LineReader<R>) -> Result<Value> {
    let kind = FieldType::parse(&r.read_line()?)?;
    match kind {
        FieldType::List | FieldType::Struct => read_body(kind, r),
        FieldType::Void => Ok(Value::Void),
        FieldType::Error => {
            let (code, message) = read_error(r)?;
            Ok(Value::Error { code, message })
        }
        scalar => Err(CodecError::TopLevelScalar(scalar)),
    }
}

/// Read the body of an error value (after its tag line).
pub(crate) fn read_error<R: BufRead>(r: &mut LineReader<R>) -> Result<(i64, String)> {
    let code = parse_integer(&r.read_line()?)?;
    let len = parse_length(&r.read_line()?)?;
    let message = String::from_utf8(r.read_exact(len)?)
        .map_err(|_| CodecError::InvalidUtf8("error message"))?;
    Ok((code, message))
}

/// Read a value whose tag has already been consumed (or is implied).
pub fn read_body<R: BufRead>(kind: FieldType, r: &mut LineReader<R>) -> Result<Value> {
    read_nested(kind, r, 1)
}

/// Fail once a container would sit deeper than [`MAX_DEPTH`].
pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }
    Ok(())
}

fn read_nested<R: BufRead>(kind: FieldType, r: &mut LineReader<R>, depth: usize) -> Result<Value> {
    match kind {
        FieldType::String => {
            let len = parse_length(&r.read_line()?)?;
            let raw = r.read_exact(len)?;
            String::from_utf8(raw)
                .map(Value::String)
                .map_err(|_| CodecError::InvalidUtf8("string"))
        }
        FieldType::Integer | FieldType::Double | FieldType::Bool => {
            parse_scalar(kind, &r.read_line()?)
        }
        FieldType::List => {
            check_depth(depth)?;
            let count = parse_count(&r.read_line()?)?;
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
            if count == 0 {
                return Ok(Value::List(items));
            }
            let element = read_member_type(r)?;
            for _ in 0..count {
                items.push(read_nested(element, r, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        FieldType::Struct => {
            check_depth(depth)?;
            let count = parse_count(&r.read_line()?)?;
            let mut fields = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                let name = r.read_line()?;
                let field = read_member_type(r)?;
                fields.push((name, read_nested(field, r, depth + 1)?));
            }
            Ok(Value::Struct(fields))
        }
        FieldType::Void | FieldType::Error => Err(CodecError::UnsupportedFieldValue(kind)),
    }
}

/// Read a tag line naming a struct field or list element type.
pub(crate) fn read_member_type<R: BufRead>(r: &mut LineReader<R>) -> Result<FieldType> {
    let kind = FieldType::parse(&r.read_line()?)?;
    if !kind.is_member() {
        return Err(CodecError::UnsupportedFieldValue(kind));
    }
    Ok(kind)
}

pub(crate) fn parse_scalar(kind: FieldType, text: &str) -> Result<Value> {
    match kind {
        FieldType::Integer => parse_integer(text).map(Value::Integer),
        FieldType::Double => match text.parse::<f64>() {
            Ok(d) if d.is_finite() => Ok(Value::Double(d)),
            _ => Err(CodecError::InvalidDouble(text.to_string())),
        },
        FieldType::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(CodecError::InvalidBool(other.to_string())),
        },
        other => Err(CodecError::UnsupportedFieldValue(other)),
    }
}

fn parse_integer(text: &str) -> Result<i64> {
    text.parse()
        .map_err(|_| CodecError::InvalidInteger(text.to_string()))
}

pub(crate) fn parse_length(text: &str) -> Result<u64> {
    text.parse()
        .map_err(|_| CodecError::InvalidLength(text.to_string()))
}

pub(crate) fn parse_count(text: &str) -> Result<usize> {
    text.parse()
        .map_err(|_| CodecError::InvalidLength(text.to_string()))
}
