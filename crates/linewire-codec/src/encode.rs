use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use bytes::Bytes;

use crate::cursor::LineWriter;
use crate::decode::check_depth;
use crate::error::{CodecError, Result};
use crate::storage::Storage;
use crate::value::{FieldType, Value};

/// Encode a top-level value into memory.
pub fn encode(value: &Value) -> Result<Bytes> {
    let mut buf = Vec::new();
    encode_to(value, &mut buf)?;
    Ok(Bytes::from(buf))
}

/// Encode a top-level value into `writer`. Returns the number of bytes written.
///
/// ```text
/// STRUCT  6\n<count>\n then per field <name>\n<tag>\n<body>
/// LIST    5\n<count>\n then, if count > 0, <elementTag>\n and each body
/// STRING  <byteLength>\n<raw bytes>
/// INTEGER / DOUBLE / BOOL   <text>\n
/// VOID    7\n
/// ERROR   8\n<code>\n<byteLength>\n<raw message>
/// ```
pub fn encode_to<W: Write>(value: &Value, writer: W) -> Result<u64> {
    let mut w = LineWriter::new(writer);
    write_top(&mut w, value)?;
    w.flush()?;
    Ok(w.position())
}

/// Encode a top-level value into a fresh spool file.
///
/// The file is removed again if encoding fails.
pub fn encode_to_spool(value: &Value, storage: &dyn Storage) -> Result<PathBuf> {
    let (path, file) = storage.create_spool()?;
    match encode_to(value, BufWriter::new(file)) {
        Ok(_) => Ok(path),
        Err(err) => {
            let _ = storage.remove(&path);
            Err(err)
        }
    }
}

/// The encoding of an empty payload.
pub fn encode_void() -> Bytes {
    Bytes::from_static(b"7\n")
}

/// The encoding of a remote error.
pub fn encode_error(code: i64, message: &str) -> Bytes {
    let mut buf = format!("8\n{code}\n{}\n", message.len()).into_bytes();
    buf.extend_from_slice(message.as_bytes());
    Bytes::from(buf)
}

fn write_top<W: Write>(w: &mut LineWriter<W>, value: &Value) -> Result<()> {
    match value {
        Value::Struct(_) | Value::List(_) => {
            w.write_line(tag_line(value.field_type()))?;
            write_body(w, value, 1)
        }
        Value::Void => w.write_line(tag_line(FieldType::Void)),
        Value::Error { code, message } => {
            w.write_line(tag_line(FieldType::Error))?;
            w.write_line(code.to_string())?;
            w.write_line(message.len().to_string())?;
            w.write_exact(message.as_bytes())
        }
        scalar => Err(CodecError::TopLevelScalar(scalar.field_type())),
    }
}

/// Write a value whose tag has already been written (or is implied).
fn write_body<W: Write>(w: &mut LineWriter<W>, value: &Value, depth: usize) -> Result<()> {
    match value {
        Value::String(s) => {
            w.write_line(s.len().to_string())?;
            w.write_exact(s.as_bytes())
        }
        Value::Integer(i) => w.write_line(i.to_string()),
        Value::Double(d) if !d.is_finite() => {
            Err(CodecError::Unrepresentable(format!("non-finite double {d}")))
        }
        Value::Double(d) => w.write_line(format_double(*d)),
        Value::Bool(b) => w.write_line(if *b { "true" } else { "false" }),
        Value::List(items) => {
            check_depth(depth)?;
            w.write_line(items.len().to_string())?;
            let Some(first) = items.first() else {
                return Ok(());
            };
            let kind = member_type(first)?;
            w.write_line(tag_line(kind))?;
            for (index, item) in items.iter().enumerate() {
                if item.field_type() != kind {
                    return Err(CodecError::HeterogeneousList {
                        expected: kind,
                        found: item.field_type(),
                        index,
                    });
                }
                write_body(w, item, depth + 1)?;
            }
            Ok(())
        }
        Value::Struct(fields) => {
            check_depth(depth)?;
            w.write_line(fields.len().to_string())?;
            let mut seen = HashSet::with_capacity(fields.len());
            for (name, field) in fields {
                if name.contains('\n') {
                    return Err(CodecError::InvalidFieldName(name.clone()));
                }
                if !seen.insert(name.as_str()) {
                    return Err(CodecError::DuplicateField(name.clone()));
                }
                let kind = member_type(field)?;
                w.write_line(name)?;
                w.write_line(tag_line(kind))?;
                write_body(w, field, depth + 1)?;
            }
            Ok(())
        }
        Value::Void | Value::Error { .. } => {
            Err(CodecError::UnsupportedFieldValue(value.field_type()))
        }
    }
}

fn member_type(value: &Value) -> Result<FieldType> {
    let kind = value.field_type();
    if !kind.is_member() {
        return Err(CodecError::UnsupportedFieldValue(kind));
    }
    Ok(kind)
}

fn tag_line(kind: FieldType) -> String {
    kind.tag().to_string()
}

/// Shortest text that parses back to the same `f64`.
pub(crate) fn format_double(d: f64) -> String {
    d.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsStorage, MemoryStorage};

    fn sample_struct() -> Value {
        Value::structure([
            ("a", Value::from("abc")),
            ("b", Value::from("efg")),
            (
                "c",
                Value::structure([("a", Value::from(89)), ("b", Value::from(true))]),
            ),
        ])
    }

    #[test]
    fn canonical_struct_fixture() {
        let encoded = encode(&sample_struct()).unwrap();
        assert_eq!(
            &encoded[..],
            b"6\n3\na\n1\n3\nabcb\n1\n3\nefgc\n6\n2\na\n2\n89\nb\n4\ntrue\n"
        );
    }

    #[test]
    fn canonical_string_list_fixture() {
        let encoded = encode(&Value::from(vec!["hello", "world", "!!"])).unwrap();
        assert_eq!(&encoded[..], b"5\n3\n1\n5\nhello5\nworld2\n!!");
    }

    #[test]
    fn empty_list_has_no_element_tag() {
        let encoded = encode(&Value::List(vec![])).unwrap();
        assert_eq!(&encoded[..], b"5\n0\n");
    }

    #[test]
    fn nested_lists_omit_inner_tags() {
        let value = Value::List(vec![
            Value::from(vec![1, 2]),
            Value::List(vec![]),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(&encoded[..], b"5\n2\n5\n2\n2\n1\n2\n0\n");
    }

    #[test]
    fn string_length_counts_bytes() {
        let value = Value::from(vec!["h\u{e9}"]);
        let encoded = encode(&value).unwrap();
        assert_eq!(&encoded[..], "5\n1\n1\n3\nh\u{e9}".as_bytes());
    }

    #[test]
    fn doubles_use_shortest_form() {
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(-2.0), "-2");
        let encoded = encode(&Value::from(vec![1.25])).unwrap();
        assert_eq!(&encoded[..], b"5\n1\n3\n1.25\n");
    }

    #[test]
    fn mixed_list_is_rejected() {
        let value = Value::List(vec![Value::from(1), Value::from("x")]);
        assert!(matches!(
            encode(&value),
            Err(CodecError::HeterogeneousList {
                expected: FieldType::Integer,
                found: FieldType::String,
                index: 1,
            })
        ));
    }

    #[test]
    fn top_level_scalar_is_rejected() {
        for value in [Value::from("x"), Value::from(1), Value::from(1.0), Value::from(false)] {
            assert!(matches!(encode(&value), Err(CodecError::TopLevelScalar(_))));
        }
    }

    #[test]
    fn void_and_error_only_at_top_level() {
        assert_eq!(&encode(&Value::Void).unwrap()[..], &encode_void()[..]);
        assert_eq!(
            &encode(&Value::error(-2, "no route")).unwrap()[..],
            b"8\n-2\n8\nno route"
        );
        assert_eq!(&encode_error(-2, "no route")[..], b"8\n-2\n8\nno route");

        let nested = Value::structure([("v", Value::Void)]);
        assert!(matches!(
            encode(&nested),
            Err(CodecError::UnsupportedFieldValue(FieldType::Void))
        ));
        let listed = Value::List(vec![Value::error(1, "x")]);
        assert!(matches!(
            encode(&listed),
            Err(CodecError::UnsupportedFieldValue(FieldType::Error))
        ));
    }

    #[test]
    fn field_names_are_single_lines() {
        let value = Value::structure([("a\nb", Value::from(1))]);
        assert!(matches!(encode(&value), Err(CodecError::InvalidFieldName(_))));
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let value = Value::structure([("a", Value::from(1)), ("a", Value::from(2))]);
        assert!(matches!(encode(&value), Err(CodecError::DuplicateField(name)) if name == "a"));

        let nested = Value::structure([
            ("a", Value::structure([("x", Value::from(1))])),
            ("b", Value::structure([("x", Value::from(2))])),
        ]);
        assert!(encode(&nested).is_ok());
    }

    #[test]
    fn non_finite_doubles_are_rejected() {
        for d in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let value = Value::structure([("d", Value::from(d))]);
            assert!(matches!(encode(&value), Err(CodecError::Unrepresentable(_))));
        }
    }

    #[test]
    fn nesting_past_the_cap_is_rejected() {
        let mut value = Value::List(vec![]);
        for _ in 1..crate::decode::MAX_DEPTH {
            value = Value::List(vec![value]);
        }
        assert!(encode(&value).is_ok());
        let value = Value::List(vec![value]);
        assert!(matches!(encode(&value), Err(CodecError::TooDeep(_))));
    }

    #[test]
    fn encode_to_reports_length() {
        let mut buf = Vec::new();
        let n = encode_to(&sample_struct(), &mut buf).unwrap();
        assert_eq!(n as usize, buf.len());
    }

    #[test]
    fn spool_matches_memory_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let path = encode_to_spool(&sample_struct(), &storage).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, encode(&sample_struct()).unwrap().to_vec());
    }

    #[test]
    fn failed_spool_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let bad = Value::List(vec![Value::from(1), Value::from(true)]);
        assert!(encode_to_spool(&bad, &storage).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn spool_without_filesystem() {
        assert!(matches!(
            encode_to_spool(&sample_struct(), &MemoryStorage),
            Err(CodecError::StorageUnavailable)
        ));
    }
}
