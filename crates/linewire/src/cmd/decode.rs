use std::fs::File;
use std::io::{self, BufReader};

use linewire_codec::decode_from;

use crate::cmd::{DecodeArgs, Globals};
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::print_value;

pub fn run(args: DecodeArgs, globals: &Globals) -> CliResult<i32> {
    let decoded = if args.path.as_os_str() == "-" {
        decode_from(io::stdin().lock())
    } else {
        let file = File::open(&args.path)
            .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), &err))?;
        decode_from(BufReader::new(file))
    };
    let value = decoded.map_err(|err| codec_error("decode failed", &err))?;
    print_value(&value, globals.format)?;
    Ok(SUCCESS)
}
