use std::fs::File;

use linewire_codec::FieldIndex;

use crate::cmd::{Globals, IndexArgs};
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::print_index;

pub fn run(args: IndexArgs, globals: &Globals) -> CliResult<i32> {
    let file = File::open(&args.path)
        .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), &err))?;
    let index = FieldIndex::from_file(file).map_err(|err| codec_error("index failed", &err))?;
    print_index(&index, globals.format);
    Ok(SUCCESS)
}
