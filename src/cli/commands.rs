//! CLI command implementations
//!
//! Every command loads the configuration first, then builds its reader,
//! finder or operator graph and copies the resulting records to stdout.

use std::path::{Path, PathBuf};

use crate::combiner::{self, Combiner, IndexStream, Output, Stream};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::io::ValueWriter;
use crate::microindex::{Finder, Keyer, Reader, WriterOptions};
use crate::runtime::exec;
use crate::runtime::op::{IndexScan, Load, Values};
use crate::runtime::RuntimeConfig;
use crate::value::{Order, TypeContext, Value};

use super::args::{Cli, Command};
use super::io::{read_records, stdout_writer};

/// Dispatch a parsed command line
pub fn run_command(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let mut out = stdout_writer(cli.json);
    match cli.command {
        Command::Create {
            output,
            keys,
            frame_thresh,
            order,
            sort,
            input,
        } => {
            let mut opts = WriterOptions::from_config(&config, keys);
            if let Some(thresh) = frame_thresh {
                opts.frame_thresh = thresh;
            }
            if let Some(order) = order {
                opts.order = order.into();
            }
            create(&config, &input, &output, opts, sort, &mut out)
        }
        Command::Lookup {
            keys,
            closest,
            index,
        } => lookup(&index, &keys, closest, &mut out),
        Command::Range { lo, hi, index } => range(&config, &index, &lo, &hi, &mut out),
        Command::Section { level, index } => section(&index, level, &mut out),
        Command::Merge {
            output,
            value,
            combine,
            inputs,
        } => merge(&config, &inputs, &output, &value, &combine, &mut out),
    }
}

/// Build the index at `output` from the NDJSON records of `input` and
/// print the `{path, records}` summary
pub fn create(
    config: &Config,
    input: &str,
    output: &Path,
    opts: WriterOptions,
    sort: bool,
    out: &mut dyn ValueWriter,
) -> Result<()> {
    let zctx = TypeContext::new();
    let mut records = read_records(input, &zctx)?;
    if sort {
        let keyer = Keyer::new(&opts.keys, opts.order)?;
        records.sort_by_cached_key(|rec| SortTuple(keyer.tuple(rec), keyer.order()));
    }
    let rt = RuntimeConfig::from(config);
    let src = Values::new(records, rt.batch_size);
    let mut load = Load::new(&zctx, Box::new(src), output, opts);
    exec::copy(&Context::background(), &mut load, out)?;
    Ok(())
}

/// Key tuple ordered the way the index writer expects
struct SortTuple(Vec<Value>, Order);

impl PartialEq for SortTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for SortTuple {}

impl PartialOrd for SortTuple {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortTuple {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.1.apply(crate::value::compare_tuples(
            &self.0,
            &other.0,
            crate::value::Nulls::First,
        ))
    }
}

/// Print the record matching `keys`, or with `closest` the first record
/// at or after it. Nothing is printed when there is no such record.
pub fn lookup(index: &Path, keys: &[String], closest: bool, out: &mut dyn ValueWriter) -> Result<()> {
    let zctx = TypeContext::new();
    let finder = Finder::open(index, &zctx)?;
    let key = finder.parse_keys(keys)?;
    let hit = if closest {
        finder.lookup_closest(&key)?
    } else {
        finder.lookup(&key)?
    };
    if let Some(rec) = hit {
        out.write(&rec)?;
    }
    out.flush()
}

/// Print the records with keys in `[lo, hi)`; an empty bound is open
pub fn range(
    config: &Config,
    index: &Path,
    lo: &[String],
    hi: &[String],
    out: &mut dyn ValueWriter,
) -> Result<()> {
    let zctx = TypeContext::new();
    let finder = Finder::open(index, &zctx)?;
    let bound = |args: &[String]| -> Result<Option<Vec<Value>>> {
        if args.is_empty() {
            Ok(None)
        } else {
            finder.parse_keys(args).map(Some)
        }
    };
    let (lo, hi) = (bound(lo)?, bound(hi)?);
    let ctx = Context::background();
    let rt = RuntimeConfig::from(config);
    let mut scan = IndexScan::new(finder.range(lo, hi, &ctx)?, rt.batch_size);
    exec::copy(&ctx, &mut scan, out)?;
    Ok(())
}

/// Print every value of one level of an index
pub fn section(index: &Path, level: usize, out: &mut dyn ValueWriter) -> Result<()> {
    let zctx = TypeContext::new();
    let reader = Reader::open(index, &zctx)?;
    if reader.is_empty() {
        return out.flush();
    }
    let mut r = reader.section_reader(level)?;
    while let Some(v) = r.read()? {
        out.write(&v)?;
    }
    out.flush()
}

/// Merge indexes sharing one key list into `output`, combining the
/// `value_field` of records with equal keys. Inputs are combined in the
/// order given.
pub fn merge(
    config: &Config,
    inputs: &[PathBuf],
    output: &Path,
    value_field: &str,
    combine: &str,
    out: &mut dyn ValueWriter,
) -> Result<()> {
    let combine = combiner::builtin(combine)?;
    let zctx = TypeContext::new();
    let mut streams = Vec::with_capacity(inputs.len());
    for path in inputs {
        let s = IndexStream::open_path(path, &zctx, value_field)
            .map_err(|e| Error::wrap(format!("merge {}", path.display()), e))?;
        streams.push(s);
    }
    let (keys, order) = match streams.first() {
        Some(s) => (s.keys().to_vec(), s.order()),
        None => return Err(Error::invalid("merge needs at least one input")),
    };
    let mut value_type = None;
    for s in &streams {
        if s.keys() != keys.as_slice() || s.order() != order {
            return Err(Error::invalid(format!(
                "{} is keyed by {:?} ({:?}) but {} is keyed by {:?} ({:?})",
                s.path().display(),
                s.keys(),
                s.order(),
                inputs[0].display(),
                keys,
                order
            )));
        }
        let ty = match s.value_type() {
            Some(ty) => ty,
            None => continue,
        };
        if let Some(want) = &value_type {
            if want != ty {
                return Err(Error::invalid(format!(
                    "field \"{}\" is {} in {} but {} elsewhere",
                    value_field,
                    ty,
                    s.path().display(),
                    want
                )));
            }
        } else {
            value_type = Some(ty.clone());
        }
    }
    let value_type = match value_type {
        Some(ty) => ty,
        // Every input is empty; any type will do.
        None => Value::null().ty().clone(),
    };
    let streams: Vec<Box<dyn Stream>> = streams
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Stream>)
        .collect();
    let mut comb = Combiner::new(streams, combine, order);
    let mut index = WriterOptions::from_config(config, keys);
    index.order = order;
    let dest = Output {
        path: output.to_path_buf(),
        index,
        value_field: value_field.to_string(),
        value_type,
    };
    let n = combiner::write_index(&zctx, &mut comb, &dest)?;
    let summary = Value::record(
        &zctx,
        vec![
            ("path", Value::string(output.display().to_string())),
            ("records", Value::uint64(n)),
        ],
    )?;
    out.write(&summary)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_ndjson(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_create_lookup_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ndjson(dir.path(), "in.json", "{\"k\":3,\"v\":\"c\"}\n{\"k\":1,\"v\":\"a\"}\n{\"k\":2,\"v\":\"b\"}\n");
        let index = dir.path().join("idx.zng");
        let opts = WriterOptions {
            keys: vec!["k".to_string()],
            frame_thresh: 1,
            order: Order::Asc,
        };
        let mut summary: Vec<Value> = Vec::new();
        create(&Config::default(), &input, &index, opts, true, &mut summary).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].field("records").unwrap().as_uint(), Some(3));

        let mut hits: Vec<Value> = Vec::new();
        lookup(&index, &["2".to_string()], false, &mut hits).unwrap();
        assert_eq!(hits[0].to_string(), r#"{k:2,v:"b"}"#);

        let mut rows: Vec<Value> = Vec::new();
        range(&Config::default(), &index, &["2".to_string()], &[], &mut rows).unwrap();
        assert_eq!(rows.len(), 2);

        let mut base: Vec<Value> = Vec::new();
        section(&index, 0, &mut base).unwrap();
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn test_create_unsorted_fails_without_sort() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ndjson(dir.path(), "in.json", "{\"k\":2}\n{\"k\":1}\n");
        let index = dir.path().join("idx.zng");
        let opts = WriterOptions {
            keys: vec!["k".to_string()],
            ..WriterOptions::default()
        };
        let mut summary: Vec<Value> = Vec::new();
        assert!(create(&Config::default(), &input, &index, opts, false, &mut summary).is_err());
        assert!(!index.exists());
    }

    #[test]
    fn test_merge_rejects_mismatched_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a_in = write_ndjson(dir.path(), "a.json", "{\"k\":1,\"n\":1}\n");
        let b_in = write_ndjson(dir.path(), "b.json", "{\"j\":1,\"n\":1}\n");
        let a = dir.path().join("a.zng");
        let b = dir.path().join("b.zng");
        let mut sink: Vec<Value> = Vec::new();
        let opts = |k: &str| WriterOptions {
            keys: vec![k.to_string()],
            ..WriterOptions::default()
        };
        create(&Config::default(), &a_in, &a, opts("k"), false, &mut sink).unwrap();
        create(&Config::default(), &b_in, &b, opts("j"), false, &mut sink).unwrap();
        let err = merge(&Config::default(), &[a, b], &dir.path().join("o.zng"), "n", "sum", &mut sink)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
    }
}
