//! Key lookups over a microindex
//!
//! A search starts at the top level, which is small enough to read whole
//! and binary search. Each lower level is then entered at the frame the
//! level above pointed to and scanned forward, until the base level is
//! reached at the frame that can hold the key.

use std::cmp::Ordering;
use std::path::Path;

use chrono::DateTime;

use super::{Keyer, Reader, SectionReader};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::{Primitive, TypeContext, Value};

/// Looks up key tuples in one microindex.
///
/// Key tuples may be shorter than the index's key list; a prefix tuple
/// matches every record whose leading keys equal it.
pub struct Finder {
    reader: Reader,
    keyer: Keyer,
}

impl Finder {
    pub fn open(path: impl AsRef<Path>, zctx: &TypeContext) -> Result<Self> {
        let reader = Reader::open(path, zctx)?;
        let trailer = reader.trailer();
        let keyer = Keyer::new(&trailer.keys, trailer.order)?;
        Ok(Self { reader, keyer })
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn keyer(&self) -> &Keyer {
        &self.keyer
    }

    /// Close the underlying reader; ranges still open on it fail on
    /// their next read.
    pub fn close(self) {
        self.reader.close()
    }

    fn child(&self, entry: &Value) -> Result<u64> {
        let field = &self.reader.trailer().child_field;
        match entry.field(field).and_then(|v| v.as_int()) {
            Some(off) if off >= 0 => Ok(off as u64),
            _ => Err(Error::invalid(format!(
                "index entry {} has no valid \"{}\" offset",
                entry, field
            ))),
        }
    }

    /// Offset within the base section of the frame where a scan for `key`
    /// must start
    fn locate(&self, key: &[Value]) -> Result<u64> {
        let top = self.reader.levels();
        if top == 0 {
            return Ok(0);
        }
        let mut entries = Vec::new();
        let mut r = self.reader.section_reader(top)?;
        while let Some(entry) = r.read()? {
            entries.push((self.keyer.tuple(&entry), self.child(&entry)?));
        }
        let idx = entries.partition_point(|(t, _)| self.keyer.compare(t, key) == Ordering::Less);
        let mut off = match idx {
            0 => entries.first().map(|(_, off)| *off).unwrap_or(0),
            n => entries[n - 1].1,
        };
        for level in (1..top).rev() {
            let mut r = self.reader.frame_reader(level, off)?;
            let mut next = None;
            while let Some(entry) = r.read()? {
                let child = self.child(&entry)?;
                if next.is_none() {
                    next = Some(child);
                }
                if self.keyer.compare(&self.keyer.tuple(&entry), key) != Ordering::Less {
                    break;
                }
                next = Some(child);
            }
            off = next.unwrap_or(0);
        }
        Ok(off)
    }

    /// Base records from the frame that may hold `key` onward
    fn seek(&self, key: &[Value]) -> Result<Option<SectionReader>> {
        if self.reader.is_empty() {
            return Ok(None);
        }
        let off = self.locate(key)?;
        self.reader.frame_reader(0, off).map(Some)
    }

    /// The first record whose key equals `key`
    pub fn lookup(&self, key: &[Value]) -> Result<Option<Value>> {
        let mut r = match self.seek(key)? {
            Some(r) => r,
            None => return Ok(None),
        };
        while let Some(rec) = r.read()? {
            match self.keyer.compare(&self.keyer.tuple(&rec), key) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(rec)),
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// The first record at or past `key` in index order
    pub fn lookup_closest(&self, key: &[Value]) -> Result<Option<Value>> {
        let mut r = match self.seek(key)? {
            Some(r) => r,
            None => return Ok(None),
        };
        while let Some(rec) = r.read()? {
            if self.keyer.compare(&self.keyer.tuple(&rec), key) != Ordering::Less {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    /// Records with keys in `[lo, hi)`; an absent bound is unbounded.
    ///
    /// The returned iterator stops without error once `ctx` is cancelled.
    pub fn range(&self, lo: Option<Vec<Value>>, hi: Option<Vec<Value>>, ctx: &Context) -> Result<Range> {
        let reader = match &lo {
            Some(lo) => self.seek(lo)?,
            None if self.reader.is_empty() => None,
            None => Some(self.reader.section_reader(0)?),
        };
        Ok(Range {
            reader,
            keyer: self.keyer.clone(),
            lo,
            hi,
            ctx: ctx.clone(),
        })
    }

    /// Convert command-line strings into a key tuple, typing each value
    /// like the corresponding key of the first indexed record. Keys of an
    /// empty index, or keys that are null in the first record, are
    /// strings.
    pub fn parse_keys(&self, args: &[String]) -> Result<Vec<Value>> {
        if args.len() > self.keyer.paths().len() {
            return Err(Error::invalid(format!(
                "{} key values given but the index has {} keys",
                args.len(),
                self.keyer.paths().len()
            )));
        }
        let first = if self.reader.is_empty() {
            None
        } else {
            self.reader.section_reader(0)?.read()?
        };
        let types: Vec<Option<Primitive>> = match &first {
            Some(rec) => self
                .keyer
                .tuple(rec)
                .iter()
                .map(|v| v.ty().under().as_primitive())
                .collect(),
            None => Vec::new(),
        };
        args.iter()
            .enumerate()
            .map(|(i, s)| parse_key(s, types.get(i).copied().flatten()))
            .collect()
    }
}

fn parse_key(s: &str, prim: Option<Primitive>) -> Result<Value> {
    let bad = |e: &dyn std::fmt::Display| Error::invalid(format!("key value \"{}\": {}", s, e));
    Ok(match prim {
        Some(Primitive::Int64) => Value::int64(s.parse().map_err(|e| bad(&e))?),
        Some(Primitive::Uint64) => Value::uint64(s.parse().map_err(|e| bad(&e))?),
        Some(Primitive::Float64) => Value::float64(s.parse().map_err(|e| bad(&e))?),
        Some(Primitive::Bool) => Value::bool(s.parse().map_err(|e| bad(&e))?),
        Some(Primitive::Duration) => Value::duration(s.parse().map_err(|e| bad(&e))?),
        Some(Primitive::Bytes) => Value::bytes_value(s.as_bytes()),
        Some(Primitive::Time) => {
            let t = DateTime::parse_from_rfc3339(s).map_err(|e| bad(&e))?;
            let nanos = t
                .timestamp_nanos_opt()
                .ok_or_else(|| bad(&"time out of range"))?;
            Value::time(nanos)
        }
        _ => Value::string(s),
    })
}

/// Iterator over the records of a key range
pub struct Range {
    reader: Option<SectionReader>,
    keyer: Keyer,
    lo: Option<Vec<Value>>,
    hi: Option<Vec<Value>>,
    ctx: Context,
}

impl Range {
    fn finish(&mut self) {
        self.reader = None;
    }
}

impl Iterator for Range {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.ctx.is_done() {
                tracing::trace!("microindex range cancelled");
                self.finish();
            }
            let rec = match self.reader.as_mut()?.read() {
                Ok(Some(rec)) => rec,
                Ok(None) => {
                    self.finish();
                    return None;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            };
            let tuple = self.keyer.tuple(&rec);
            if let Some(lo) = &self.lo {
                if self.keyer.compare(&tuple, lo) == Ordering::Less {
                    continue;
                }
            }
            if let Some(hi) = &self.hi {
                if self.keyer.compare(&tuple, hi) != Ordering::Less {
                    self.finish();
                    return None;
                }
            }
            return Some(Ok(rec));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microindex::{Writer, WriterOptions};
    use crate::value::Order;
    use tempfile::TempDir;

    fn build(dir: &TempDir, keys: &[&str], thresh: usize, order: Order) -> std::path::PathBuf {
        let path = dir.path().join("idx.zng");
        let zctx = TypeContext::new();
        let opts = WriterOptions {
            keys: vec!["key".into()],
            frame_thresh: thresh,
            order,
        };
        let mut w = Writer::new(&zctx, &path, opts).unwrap();
        for (i, k) in keys.iter().enumerate() {
            let rec = Value::record(&zctx, vec![("key", Value::string(k)), ("n", Value::int64(i as i64))]).unwrap();
            w.write(&rec).unwrap();
        }
        w.close().unwrap();
        path
    }

    fn s(k: &str) -> Vec<Value> {
        vec![Value::string(k)]
    }

    fn keys(it: Range) -> Vec<String> {
        it.map(|r| r.unwrap().field("key").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_lookup_closest_and_range() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, &["a", "b", "c", "d", "e"], 2, Order::Asc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        let c = f.lookup(&s("c")).unwrap().unwrap();
        assert_eq!(c.field("n").unwrap().as_int(), Some(2));
        assert!(f.lookup(&s("cc")).unwrap().is_none());
        assert_eq!(f.lookup_closest(&s("cc")).unwrap().unwrap().field("key").unwrap().as_str(), Some("d"));
        assert!(f.lookup_closest(&s("f")).unwrap().is_none());
        let r = f.range(Some(s("b")), Some(s("e")), &Context::background()).unwrap();
        assert_eq!(keys(r), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_lookup_every_key_of_a_deep_index() {
        let dir = TempDir::new().unwrap();
        let all: Vec<String> = (0..2000).map(|i| format!("k{:05}", i)).collect();
        let refs: Vec<&str> = all.iter().map(|s| s.as_str()).collect();
        let path = build(&dir, &refs, 64, Order::Asc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        assert!(f.reader().levels() >= 2);
        for (i, k) in all.iter().enumerate().step_by(37) {
            let rec = f.lookup(&s(k)).unwrap().unwrap();
            assert_eq!(rec.field("n").unwrap().as_int(), Some(i as i64));
        }
        assert!(f.lookup(&s("a")).unwrap().is_none());
        assert!(f.lookup(&s("z")).unwrap().is_none());
    }

    #[test]
    fn test_descending_index() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, &["e", "d", "c", "b", "a"], 2, Order::Desc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        assert!(f.lookup(&s("b")).unwrap().is_some());
        let closest = f.lookup_closest(&s("bb")).unwrap().unwrap();
        assert_eq!(closest.field("key").unwrap().as_str(), Some("b"));
        let r = f.range(Some(s("d")), Some(s("a")), &Context::background()).unwrap();
        assert_eq!(keys(r), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_range_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, &["a", "b", "c"], 2, Order::Asc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        let ctx = Context::background().with_cancel();
        let mut r = f.range(None, None, &ctx).unwrap();
        assert!(r.next().unwrap().is_ok());
        ctx.cancel();
        assert!(r.next().is_none());
        assert!(r.next().is_none());
    }

    #[test]
    fn test_range_fails_after_close() {
        let dir = TempDir::new().unwrap();
        let all: Vec<String> = (0..3000).map(|i| format!("k{:05}", i)).collect();
        let refs: Vec<&str> = all.iter().map(|s| s.as_str()).collect();
        let path = build(&dir, &refs, 64, Order::Asc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        let mut r = f.range(None, None, &Context::background()).unwrap();
        assert!(r.next().unwrap().is_ok());
        f.close();
        assert!(r.any(|rec| rec.is_err()));
    }

    #[test]
    fn test_empty_index_finds_nothing() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, &[], 2, Order::Asc);
        let f = Finder::open(&path, &TypeContext::new()).unwrap();
        assert!(f.lookup(&s("a")).unwrap().is_none());
        assert_eq!(f.range(None, None, &Context::background()).unwrap().count(), 0);
        assert_eq!(f.parse_keys(&["7".into()]).unwrap(), vec![Value::string("7")]);
    }

    #[test]
    fn test_parse_keys_follows_key_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ints.zng");
        let zctx = TypeContext::new();
        let opts = WriterOptions {
            keys: vec!["id".into(), "ts".into()],
            ..Default::default()
        };
        let mut w = Writer::new(&zctx, &path, opts).unwrap();
        let rec = Value::record(&zctx, vec![("id", Value::int64(1)), ("ts", Value::time(0))]).unwrap();
        w.write(&rec).unwrap();
        w.close().unwrap();
        let f = Finder::open(&path, &zctx).unwrap();
        let keys = f.parse_keys(&["42".into(), "1970-01-01T00:00:01Z".into()]).unwrap();
        assert_eq!(keys, vec![Value::int64(42), Value::time(1_000_000_000)]);
        assert!(f.parse_keys(&["x".into()]).is_err());
        assert!(f.parse_keys(&["1".into(), "2".into(), "3".into()]).is_err());
    }
}
