use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linewire_codec::{FieldIndex, FieldInfo, Value};
use linewire_frame::MsgMode;
use serde::Serialize;

use crate::exit::{codec_error, CliResult};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print a decoded value. `Raw` writes its wire encoding.
pub fn print_value(value: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", compact(value)?),
        OutputFormat::Pretty => {
            let json = value.to_json().map_err(|e| codec_error("render failed", &e))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| "null".to_string())
            );
        }
        OutputFormat::Table => println!("{}", value_table(value)?),
        OutputFormat::Raw => {
            let bytes = linewire_codec::encode(value).map_err(|e| codec_error("encode failed", &e))?;
            print_raw(&bytes);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    msg_id: &'a str,
    mode: String,
    payload: serde_json::Value,
}

/// Print the response to a request.
pub fn print_response(msg_id: &str, mode: MsgMode, value: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                msg_id,
                mode: mode.to_string(),
                payload: value.to_json().map_err(|e| codec_error("render failed", &e))?,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
            Ok(())
        }
        OutputFormat::Pretty => {
            println!("msg_id={msg_id} mode={mode} payload={}", compact(value)?);
            Ok(())
        }
        other => print_value(value, other),
    }
}

#[derive(Serialize)]
struct RequestOutput<'a> {
    cmd: &'a str,
    msg_id: &'a str,
    mode: String,
    timestamp: String,
}

/// Print one request handled by `serve`.
pub fn print_request(cmd: &str, msg_id: &str, mode: MsgMode, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RequestOutput {
                cmd,
                msg_id,
                mode: mode.to_string(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CMD", "MSG ID", "MODE"])
                .add_row(vec![cmd.to_string(), msg_id.to_string(), mode.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("cmd={cmd} msg_id={msg_id} mode={mode}");
        }
    }
}

#[derive(Serialize)]
struct NodeOutput {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    start: u64,
    end: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeOutput>,
}

fn node(info: &FieldInfo) -> NodeOutput {
    NodeOutput {
        name: info.name().to_string(),
        kind: info.value_type().name(),
        start: info.start(),
        end: info.end(),
        children: info.children().iter().map(node).collect(),
    }
}

/// Print the field index of an encoded payload.
pub fn print_index(index: &FieldIndex, format: OutputFormat) {
    let nodes: Vec<NodeOutput> = index.fields().iter().map(node).collect();
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(&nodes).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!("{}", index.kind().name());
            for n in &nodes {
                print_tree(n, 1);
            }
        }
        OutputFormat::Table => {
            let mut rows = Vec::new();
            for n in &nodes {
                flatten(n, "", &mut rows);
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "TYPE", "START", "END", "LEN"]);
            for row in rows {
                table.add_row(row);
            }
            println!("{table}");
        }
    }
}

fn print_tree(n: &NodeOutput, depth: usize) {
    println!(
        "{:indent$}{} ({}) [{}..{})",
        "",
        n.name,
        n.kind,
        n.start,
        n.end,
        indent = depth * 2
    );
    for child in &n.children {
        print_tree(child, depth + 1);
    }
}

fn flatten(n: &NodeOutput, prefix: &str, rows: &mut Vec<Vec<String>>) {
    let path = if prefix.is_empty() {
        n.name.clone()
    } else {
        format!("{prefix}.{}", n.name)
    };
    rows.push(vec![
        path.clone(),
        n.kind.to_string(),
        n.start.to_string(),
        n.end.to_string(),
        (n.end - n.start).to_string(),
    ]);
    for child in &n.children {
        flatten(child, &path, rows);
    }
}

fn compact(value: &Value) -> CliResult<String> {
    let json = value.to_json().map_err(|e| codec_error("render failed", &e))?;
    Ok(serde_json::to_string(&json).unwrap_or_else(|_| "null".to_string()))
}

fn value_table(value: &Value) -> CliResult<Table> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "TYPE", "VALUE"]);
    match value {
        Value::Struct(fields) => {
            for (name, member) in fields {
                table.add_row(vec![
                    name.clone(),
                    member.field_type().name().to_string(),
                    compact(member)?,
                ]);
            }
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                table.add_row(vec![
                    i.to_string(),
                    item.field_type().name().to_string(),
                    compact(item)?,
                ]);
            }
        }
        Value::Error { code, message } => {
            table.add_row(vec!["error".to_string(), code.to_string(), message.clone()]);
        }
        other => {
            table.add_row(vec![
                String::new(),
                other.field_type().name().to_string(),
                compact(other)?,
            ]);
        }
    }
    Ok(table)
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_nodes_carry_offsets() {
        let bytes = linewire_codec::encode(&Value::structure([
            ("a", Value::from("abc")),
            ("c", Value::structure([("b", Value::from(true))])),
        ]))
        .unwrap();
        let index = FieldIndex::from_bytes(bytes).unwrap();
        let nodes: Vec<NodeOutput> = index.fields().iter().map(node).collect();
        assert_eq!(nodes[0].name, "a");
        assert_eq!((nodes[0].start, nodes[0].end), (10, 13));
        assert_eq!(nodes[1].children[0].name, "b");

        let mut rows = Vec::new();
        for n in &nodes {
            flatten(n, "", &mut rows);
        }
        assert_eq!(rows[2][0], "c.b");
        assert_eq!(rows[2][1], "bool");
    }

    #[test]
    fn test_value_table_lists_struct_fields() {
        let table = value_table(&Value::structure([("n", Value::from(3))])).unwrap();
        let rendered = table.to_string();
        assert!(rendered.contains("integer"));
        assert!(rendered.contains('3'));
    }
}
