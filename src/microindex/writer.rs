//! Microindex writer
//!
//! The base level streams straight into the output file. Each index level
//! above it spools into a temporary file and is appended to the output,
//! top level first, when the writer is closed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::SpooledTempFile;

use super::{IndexError, Keyer, Trailer, CHILD_FIELD, FRAME_MAX_SIZE, FRAME_THRESH, MAX_LEVELS};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::value::{Field, Order, Type, TypeContext, Value};
use crate::zngio;

/// Parent levels stay in memory until they grow past this many bytes
const SPOOL_LIMIT: usize = 1024 * 1024;

/// Settings for building one microindex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Dotted key paths, in precedence order
    pub keys: Vec<String>,
    /// Minimum frame size in bytes
    pub frame_thresh: usize,
    pub order: Order,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            keys: vec!["key".to_string()],
            frame_thresh: FRAME_THRESH,
            order: Order::Asc,
        }
    }
}

impl WriterOptions {
    /// Options for `keys` taking the frame threshold and order from `cfg`
    pub fn from_config(cfg: &Config, keys: Vec<String>) -> Self {
        Self {
            keys,
            frame_thresh: cfg.frame_thresh,
            order: cfg.order,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_thresh == 0 || self.frame_thresh > FRAME_MAX_SIZE {
            return Err(IndexError::FrameThresh(self.frame_thresh).into());
        }
        if self.keys.is_empty() {
            return Err(Error::invalid("microindex needs at least one key"));
        }
        Ok(())
    }
}

/// A frame that was just closed, described by its first entry
struct Closed {
    tuple: Vec<Value>,
    key: Value,
    offset: u64,
}

/// One level of the index under construction
struct Level<W: Write> {
    zw: zngio::Writer<W>,
    thresh: usize,
    /// A frame is never closed with fewer entries than this
    min_entries: usize,
    frame_start: u64,
    entries: usize,
    first: Option<(Vec<Value>, Value)>,
    last: Option<Vec<Value>>,
}

impl<W: Write> Level<W> {
    fn new(w: W, thresh: usize, min_entries: usize) -> Self {
        Self {
            zw: zngio::Writer::new(w),
            thresh,
            min_entries,
            frame_start: 0,
            entries: 0,
            first: None,
            last: None,
        }
    }

    fn frame_size(&self) -> usize {
        (self.zw.position() - self.frame_start) as usize
    }

    /// Append `value`, whose key tuple is `tuple`. The current frame is
    /// closed first when it is full and `tuple` starts a new key; the
    /// closed frame is returned so its entry can go to the parent level.
    fn add<F>(&mut self, keyer: &Keyer, tuple: Vec<Value>, value: &Value, key_record: F) -> Result<Option<Closed>>
    where
        F: FnOnce() -> Result<Value>,
    {
        let mut closed = None;
        if self.entries >= self.min_entries && self.frame_size() >= self.thresh {
            let new_key = match &self.last {
                Some(last) => keyer.compare(last, &tuple) != Ordering::Equal,
                None => true,
            };
            if new_key {
                closed = self.end_frame()?;
            }
        }
        if self.entries == 0 {
            self.first = Some((tuple.clone(), key_record()?));
        }
        self.zw.write(value)?;
        self.entries += 1;
        self.last = Some(tuple);
        Ok(closed)
    }

    /// Terminate the current frame, if it holds anything
    fn end_frame(&mut self) -> Result<Option<Closed>> {
        let (tuple, key) = match self.first.take() {
            Some(first) => first,
            None => return Ok(None),
        };
        self.zw.end_stream()?;
        let offset = self.frame_start;
        self.frame_start = self.zw.position();
        tracing::trace!(offset, entries = self.entries, "microindex frame closed");
        self.entries = 0;
        Ok(Some(Closed { tuple, key, offset }))
    }
}

/// Builds a microindex from records that arrive sorted by key.
///
/// Records are written with [`Writer::write`]; [`Writer::close`] assembles
/// the index levels and the trailer. On error the caller should call
/// [`Writer::abort`] so no partial file is left behind.
pub struct Writer {
    path: PathBuf,
    zctx: TypeContext,
    opts: WriterOptions,
    keyer: Keyer,
    child_field: String,
    base: Option<Level<BufWriter<File>>>,
    parents: Vec<Level<SpooledTempFile>>,
    prev: Option<Vec<Value>>,
    key_types: Vec<Option<Type>>,
    entry_types: HashMap<Type, Type>,
    records: u64,
}

impl Writer {
    /// Create the output file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the options are invalid or the file cannot be created.
    pub fn new(zctx: &TypeContext, path: impl AsRef<Path>, opts: WriterOptions) -> Result<Self> {
        opts.validate()?;
        let keyer = Keyer::new(&opts.keys, opts.order)?;
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| Error::wrap(format!("create {}", path.display()), e.into()))?;
        let child_field = unique_child_field(&keyer);
        let nkeys = opts.keys.len();
        Ok(Self {
            base: Some(Level::new(BufWriter::new(file), opts.frame_thresh, 1)),
            path,
            zctx: zctx.clone(),
            keyer,
            child_field,
            parents: Vec::new(),
            prev: None,
            key_types: vec![None; nkeys],
            entry_types: HashMap::new(),
            records: 0,
            opts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of base records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one record to the base level.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::BadOrder` if the record's key sorts before the
    /// previous key, and `IndexError::KeyTypeDrift` if a key field changed
    /// type.
    pub fn write(&mut self, rec: &Value) -> Result<()> {
        let tuple = self.keyer.tuple(rec);
        self.check(&tuple)?;
        let base = self
            .base
            .as_mut()
            .ok_or_else(|| Error::other("microindex writer is closed"))?;
        let keyer = &self.keyer;
        let zctx = &self.zctx;
        let closed = base.add(keyer, tuple.clone(), rec, || keyer.key_record(zctx, &tuple))?;
        self.records += 1;
        self.prev = Some(tuple);
        if let Some(closed) = closed {
            self.push(0, closed)?;
        }
        Ok(())
    }

    fn check(&mut self, tuple: &[Value]) -> Result<()> {
        if let Some(prev) = &self.prev {
            if self.keyer.compare(prev, tuple) == Ordering::Greater {
                return Err(IndexError::BadOrder {
                    prev: format_tuple(prev),
                    next: format_tuple(tuple),
                }
                .into());
            }
        }
        for ((v, seen), path) in tuple.iter().zip(&mut self.key_types).zip(self.keyer.paths()) {
            if v.is_null() {
                continue;
            }
            match seen {
                Some(t) if *t != *v.ty() => {
                    return Err(IndexError::KeyTypeDrift {
                        field: path.to_string(),
                        was: t.to_string(),
                        now: v.ty().to_string(),
                    }
                    .into())
                }
                Some(_) => {}
                None => *seen = Some(v.ty().clone()),
            }
        }
        Ok(())
    }

    /// Add the entry for `closed` to parent level `level` (0 is level 1),
    /// cascading upward while parents close frames of their own
    fn push(&mut self, level: usize, closed: Closed) -> Result<()> {
        let mut pending = Some((level, closed));
        while let Some((lvl, closed)) = pending.take() {
            if lvl == self.parents.len() {
                self.add_level()?;
            }
            let entry = self.entry(&closed.key, closed.offset)?;
            let key = closed.key;
            let parent = &mut self.parents[lvl];
            if let Some(up) = parent.add(&self.keyer, closed.tuple, &entry, || Ok(key))? {
                pending = Some((lvl + 1, up));
            }
        }
        Ok(())
    }

    fn add_level(&mut self) -> Result<()> {
        if self.parents.len() + 1 >= MAX_LEVELS {
            return Err(IndexError::TooManyLevels.into());
        }
        self.parents.push(Level::new(
            SpooledTempFile::new(SPOOL_LIMIT),
            self.opts.frame_thresh,
            2,
        ));
        tracing::debug!(
            path = %self.path.display(),
            level = self.parents.len(),
            "microindex level created"
        );
        Ok(())
    }

    /// The index entry pointing at the frame at `offset` whose first key
    /// record is `key`
    fn entry(&mut self, key: &Value, offset: u64) -> Result<Value> {
        let ty = match self.entry_types.get(key.ty()) {
            Some(t) => t.clone(),
            None => {
                let mut fields = key
                    .ty()
                    .fields()
                    .ok_or_else(|| Error::invalid(format!("key {} is not a record", key)))?
                    .to_vec();
                fields.push(Field::new(self.child_field.clone(), Type::int64()));
                let t = self.zctx.lookup_record(fields)?;
                self.entry_types.insert(key.ty().clone(), t.clone());
                t
            }
        };
        let mut vals: Vec<Value> = key.fields()?.into_iter().map(|(_, v)| v).collect();
        vals.push(Value::int64(offset as i64));
        Value::record_of(ty, &vals)
    }

    /// Flush every level and write the trailer.
    ///
    /// An index with no records is a trailer-only file.
    pub fn close(mut self) -> Result<()> {
        let mut base = self
            .base
            .take()
            .ok_or_else(|| Error::other("microindex writer is closed"))?;
        let mut trailer = Trailer::new(self.opts.keys.clone(), self.opts.order, self.opts.frame_thresh);
        trailer.child_field = self.child_field.clone();
        if self.records > 0 {
            // Only a level that already feeds a parent pushes its final
            // frame up; the top level stays a single frame.
            let last = base.end_frame()?;
            if !self.parents.is_empty() {
                if let Some(closed) = last {
                    self.push(0, closed)?;
                }
            }
            let mut lvl = 0;
            while lvl < self.parents.len() {
                let last = self.parents[lvl].end_frame()?;
                if lvl + 1 < self.parents.len() {
                    if let Some(closed) = last {
                        self.push(lvl + 1, closed)?;
                    }
                }
                lvl += 1;
            }
            trailer.sections.push(base.zw.position());
            for level in self.parents.iter_mut().rev() {
                let size = level.zw.position();
                let spool = level.zw.get_mut();
                spool.seek(SeekFrom::Start(0))?;
                let n = io::copy(spool, base.zw.get_mut())?;
                if n != size {
                    return Err(Error::other(format!(
                        "microindex level copied {} bytes, expected {}",
                        n, size
                    )));
                }
                trailer.sections.push(size);
            }
        }
        let out = base.zw.get_mut();
        out.write_all(&trailer.encode(&self.zctx)?)?;
        out.flush()?;
        tracing::debug!(
            path = %self.path.display(),
            records = self.records,
            levels = trailer.levels(),
            "microindex written"
        );
        Ok(())
    }

    /// Discard the index, removing the partially written file
    pub fn abort(mut self) -> Result<()> {
        self.base = None;
        self.parents.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The child offset field must not shadow a top-level key field
fn unique_child_field(keyer: &Keyer) -> String {
    let taken = |name: &str| {
        keyer
            .paths()
            .iter()
            .any(|p| p.segments().first().map(|s| s.as_str()) == Some(name))
    };
    let mut name = CHILD_FIELD.to_string();
    let mut n = 0;
    while taken(&name) {
        n += 1;
        name = format!("{}_{}", CHILD_FIELD, n);
    }
    name
}

fn format_tuple(tuple: &[Value]) -> String {
    let parts: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(","))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::ErrorKind;
    use crate::microindex::Reader;
    use tempfile::TempDir;

    fn rec(zctx: &TypeContext, key: i64) -> Value {
        Value::record(zctx, vec![("key", Value::int64(key)), ("v", Value::string("payload"))]).unwrap()
    }

    fn opts(thresh: usize) -> WriterOptions {
        WriterOptions {
            frame_thresh: thresh,
            ..Default::default()
        }
    }

    #[test]
    fn test_writer_builds_levels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idx.zng");
        let zctx = TypeContext::new();
        let mut w = Writer::new(&zctx, &path, opts(64)).unwrap();
        for k in 0..500 {
            w.write(&rec(&zctx, k)).unwrap();
        }
        w.close().unwrap();

        let r = Reader::open(&path, &zctx).unwrap();
        assert!(!r.is_empty());
        assert!(r.levels() >= 2, "levels = {}", r.levels());
        assert_eq!(r.trailer().child_field, "_child");
    }

    #[test]
    fn test_equal_keys_share_a_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.zng");
        let zctx = TypeContext::new();
        let mut w = Writer::new(&zctx, &path, opts(1)).unwrap();
        for k in [1, 1, 1, 2, 2, 3] {
            w.write(&rec(&zctx, k)).unwrap();
        }
        w.close().unwrap();

        let r = Reader::open(&path, &zctx).unwrap();
        let mut level1 = r.section_reader(1).unwrap();
        let mut keys = Vec::new();
        while let Some(entry) = level1.read().unwrap() {
            keys.push(entry.field("key").unwrap().as_int().unwrap());
        }
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let dir = TempDir::new().unwrap();
        let zctx = TypeContext::new();
        let mut w = Writer::new(&zctx, dir.path().join("bad.zng"), opts(64)).unwrap();
        w.write(&rec(&zctx, 2)).unwrap();
        let err = w.write(&rec(&zctx, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("out of order"));
        w.abort().unwrap();
        assert!(!dir.path().join("bad.zng").exists());
    }

    #[test]
    fn test_descending_order() {
        let dir = TempDir::new().unwrap();
        let zctx = TypeContext::new();
        let o = WriterOptions {
            order: Order::Desc,
            ..opts(64)
        };
        let mut w = Writer::new(&zctx, dir.path().join("desc.zng"), o).unwrap();
        w.write(&rec(&zctx, 5)).unwrap();
        w.write(&rec(&zctx, 3)).unwrap();
        assert!(w.write(&rec(&zctx, 4)).is_err());
    }

    #[test]
    fn test_key_type_drift_rejected() {
        let dir = TempDir::new().unwrap();
        let zctx = TypeContext::new();
        let mut w = Writer::new(&zctx, dir.path().join("drift.zng"), opts(64)).unwrap();
        w.write(&rec(&zctx, 1)).unwrap();
        let s = Value::record(&zctx, vec![("key", Value::string("2"))]).unwrap();
        let err = w.write(&s).unwrap_err();
        assert!(err.to_string().contains("changed type"));
    }

    #[test]
    fn test_empty_index_is_trailer_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.zng");
        let zctx = TypeContext::new();
        Writer::new(&zctx, &path, opts(64)).unwrap().close().unwrap();
        let r = Reader::open(&path, &zctx).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.levels(), 0);
        assert_eq!(r.trailer().data_len(), 0);
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_frame_thresh_bounds() {
        let dir = TempDir::new().unwrap();
        let zctx = TypeContext::new();
        assert!(Writer::new(&zctx, dir.path().join("a"), opts(0)).is_err());
        assert!(Writer::new(&zctx, dir.path().join("b"), opts(FRAME_MAX_SIZE + 1)).is_err());
    }

    #[test]
    fn test_child_field_renamed_on_collision() {
        let keyer = Keyer::new(&["_child".into(), "_child_1".into()], Order::Asc).unwrap();
        assert_eq!(unique_child_field(&keyer), "_child_2");
    }
}
