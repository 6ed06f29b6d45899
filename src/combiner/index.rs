use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{Pair, Stream};
use crate::error::{Error, Result};
use crate::microindex::{Keyer, Reader, SectionReader, Writer, WriterOptions};
use crate::value::{Order, Type, TypeContext, Value};

/// Stream over the base records of a microindex. A pair's key is the key
/// record of a base record and its value is the body of `value_field`,
/// with a null value read as an empty body.
pub struct IndexStream {
    reader: Reader,
    keyer: Keyer,
    value_field: String,
    value_type: Option<Type>,
    section: Option<SectionReader>,
}

impl IndexStream {
    pub fn open_path(path: impl AsRef<Path>, zctx: &TypeContext, value_field: &str) -> Result<Self> {
        let reader = Reader::open(path, zctx)?;
        let trailer = reader.trailer();
        let keyer = Keyer::new(&trailer.keys, trailer.order)?;
        let mut s = Self {
            reader,
            keyer,
            value_field: value_field.to_string(),
            value_type: None,
            section: None,
        };
        if !s.reader.is_empty() {
            if let Some(first) = s.reader.section_reader(0)?.read()? {
                s.value_type = Some(s.field_of(&first)?.ty().clone());
            }
        }
        Ok(s)
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn keys(&self) -> &[String] {
        &self.reader.trailer().keys
    }

    pub fn order(&self) -> Order {
        self.reader.trailer().order
    }

    /// Type of the value field, or `None` for an empty index
    pub fn value_type(&self) -> Option<&Type> {
        self.value_type.as_ref()
    }

    fn field_of(&self, rec: &Value) -> Result<Value> {
        rec.field(&self.value_field).ok_or_else(|| {
            Error::invalid(format!(
                "record {} in {} has no field \"{}\"",
                rec,
                self.path().display(),
                self.value_field
            ))
        })
    }
}

impl Stream for IndexStream {
    fn open(&mut self) -> Result<()> {
        self.section = if self.reader.is_empty() {
            None
        } else {
            Some(self.reader.section_reader(0)?)
        };
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Pair>> {
        let rec = match self.section.as_mut() {
            Some(r) => match r.read()? {
                Some(rec) => rec,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let val = self.field_of(&rec)?;
        if let Some(ty) = &self.value_type {
            if val.ty() != ty {
                return Err(Error::invalid(format!(
                    "field \"{}\" changed type from {} to {} in {}",
                    self.value_field,
                    ty,
                    val.ty(),
                    self.path().display()
                )));
            }
        }
        let key = self
            .keyer
            .key_record(self.reader.type_context(), &self.keyer.tuple(&rec))?;
        let body = val.bytes().cloned().unwrap_or_else(Bytes::new);
        Ok(Some(Pair { key, value: body }))
    }

    fn close(&mut self) -> Result<()> {
        self.section = None;
        Ok(())
    }
}

/// Options for writing a stream back out as a microindex
#[derive(Debug, Clone)]
pub struct Output {
    pub path: PathBuf,
    pub index: WriterOptions,
    pub value_field: String,
    pub value_type: Type,
}

/// Drain `stream` into a new microindex whose records are the key
/// fields followed by the value field. Returns the number of records
/// written; the output file is removed if anything fails.
pub fn write_index<S: Stream + ?Sized>(
    zctx: &TypeContext,
    stream: &mut S,
    out: &Output,
) -> Result<u64> {
    let mut w = Writer::new(zctx, &out.path, out.index.clone())?;
    stream.open()?;
    let res = (|| {
        while let Some(p) = stream.read()? {
            let mut fields = p.key.fields()?;
            fields.push((
                out.value_field.clone(),
                Value::new(out.value_type.clone(), Some(p.value)),
            ));
            w.write(&Value::record(zctx, fields)?)?;
        }
        Ok(())
    })();
    let closed = stream.close();
    if let Err(e) = res.and(closed) {
        w.abort()?;
        return Err(e);
    }
    let n = w.records();
    w.close()?;
    tracing::debug!(path = %out.path.display(), records = n, "wrote combined index");
    Ok(n)
}
