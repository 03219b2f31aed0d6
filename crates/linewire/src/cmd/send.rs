use std::time::Duration;

use linewire_client::{Client, Context, ContextError};
use linewire_codec::Value;
use linewire_transport::UnixSocketConnector;
use tracing::debug;

use crate::cmd::encode::parse_json;
use crate::cmd::{Globals, SendArgs};
use crate::exit::{context_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_response;

pub fn run(args: SendArgs, globals: &Globals) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let value = match &args.json {
        Some(json) => parse_json(json)?,
        None => Value::Void,
    };

    let client = Client::builder(UnixSocketConnector::new(&args.path))
        .with_storage(globals.storage())
        .connect()
        .map_err(|err| context_error("connect failed", &err))?;

    let pending = client.send_with_mode(&args.cmd, args.mode.into(), Some(&value));
    let request = pending.request().clone();
    let outcome = wait_for_response(pending, timeout).and_then(|response| report(&response, globals));

    // Releases the request and its response, spool files included.
    request.destroy();
    if let Err(err) = client.close() {
        debug!(error = %err, "close failed");
    }
    outcome
}

fn wait_for_response(
    pending: linewire_client::PendingResponse,
    timeout: Duration,
) -> CliResult<Context> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("runtime setup failed", &err))?;
    runtime
        .block_on(async { tokio::time::timeout(timeout, pending).await })
        .map_err(|_| CliError::new(TIMEOUT, format!("no response within {timeout:?}")))?
        .map_err(|err| context_error("request failed", &err))
}

fn report(response: &Context, globals: &Globals) -> CliResult<i32> {
    let value = response
        .decode()
        .map_err(|err| context_error("response unreadable", &err))?;
    print_response(&response.msg_id(), response.mode(), &value, globals.format)?;
    match response.error() {
        Some(err @ ContextError::Remote { .. }) => Err(context_error("peer returned an error", &err)),
        _ => Ok(SUCCESS),
    }
}

/// Parse `500ms`, `5s`, `2m` or a bare number of seconds.
fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    if amount == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        other => Err(CliError::new(USAGE, format!("unknown duration unit {other:?}"))),
    }
}
