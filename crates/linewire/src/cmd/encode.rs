use std::fs;

use linewire_codec::Value;
use tracing::info;

use crate::cmd::{EncodeArgs, Globals};
use crate::exit::{codec_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_raw;

pub fn run(args: EncodeArgs, _globals: &Globals) -> CliResult<i32> {
    let value = resolve_value(&args)?;
    let bytes = linewire_codec::encode(&value).map_err(|err| codec_error("encode failed", &err))?;

    match &args.out {
        Some(path) => {
            fs::write(path, &bytes)
                .map_err(|err| io_error(&format!("failed writing {}", path.display()), &err))?;
            info!(path = %path.display(), bytes = bytes.len(), "wrote encoding");
        }
        None => print_raw(&bytes),
    }
    Ok(SUCCESS)
}

fn resolve_value(args: &EncodeArgs) -> CliResult<Value> {
    let text = match (&args.json, &args.file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err))?,
        (None, None) => return Err(CliError::new(USAGE, "one of --json or --file is required")),
    };
    parse_json(&text)
}

/// Parse JSON text into a value.
pub fn parse_json(text: &str) -> CliResult<Value> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| CliError::new(USAGE, format!("payload is not valid JSON: {err}")))?;
    Value::from_json(&json).map_err(|err| codec_error("payload cannot be encoded", &err))
}
