use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use linewire_codec::FsStorage;
use linewire_frame::MsgMode;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod index;
pub mod send;
pub mod serve;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a JSON value into the wire format.
    Encode(EncodeArgs),
    /// Decode a wire-format file and print it.
    Decode(DecodeArgs),
    /// Print the field index of a wire-format file.
    Index(IndexArgs),
    /// Send one request and print the response.
    Send(SendArgs),
    /// Echo requests for the given commands back to their senders.
    Serve(ServeArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub format: OutputFormat,
    pub spool_dir: Option<PathBuf>,
}

impl Globals {
    /// Spool storage for file-mode payloads.
    pub fn storage(&self) -> FsStorage {
        self.spool_dir
            .as_ref()
            .map(FsStorage::new)
            .unwrap_or_default()
    }
}

pub fn run(command: Command, globals: &Globals) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, globals),
        Command::Decode(args) => decode::run(args, globals),
        Command::Index(args) => index::run(args, globals),
        Command::Send(args) => send::run(args, globals),
        Command::Serve(args) => serve::run(args, globals),
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum ModeArg {
    #[default]
    Mem,
    File,
}

impl From<ModeArg> for MsgMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mem => MsgMode::Mem,
            ModeArg::File => MsgMode::File,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON value to encode.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the JSON value from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Write the encoding to this file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Encoded file (`-` for stdin).
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Encoded file.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Command name.
    pub cmd: String,
    /// JSON payload. Omit to send a void payload.
    #[arg(long)]
    pub json: Option<String>,
    /// Payload transfer mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Mem)]
    pub mode: ModeArg,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Commands to answer (comma-separated).
    #[arg(long = "cmd", value_delimiter = ',', required = true)]
    pub cmds: Vec<String>,
    /// Exit after answering N requests.
    #[arg(long)]
    pub count: Option<usize>,
}
