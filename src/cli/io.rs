//! Record I/O for CLI commands
//!
//! - Input: NDJSON objects from a file or stdin
//! - Output: one record per line on stdout, as text or NDJSON

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};

use crate::error::{Error, Result};
use crate::io::{JsonWriter, NdjsonReader, TextWriter, ValueWriter};
use crate::value::{TypeContext, Value};

/// Read every record of an NDJSON file, or stdin for "-"
pub fn read_records(input: &str, zctx: &TypeContext) -> Result<Vec<Value>> {
    let r: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let f = File::open(input).map_err(|e| Error::wrap(input, e.into()))?;
        Box::new(BufReader::new(f))
    };
    NdjsonReader::new(r, zctx)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::wrap(input, e))
}

/// Record writer on stdout
pub fn stdout_writer(json: bool) -> Box<dyn ValueWriter> {
    let out = BufWriter::new(io::stdout());
    if json {
        Box::new(JsonWriter::new(out))
    } else {
        Box::new(TextWriter::new(out))
    }
}
