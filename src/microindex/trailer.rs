//! Microindex trailer and footer

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;

use super::{IndexError, CHILD_FIELD, FRAME_THRESH, MAGIC, VERSION};
use crate::error::{Error, Result};
use crate::value::primitive::encode_int;
use crate::value::{Order, Type, TypeContext, Value};
use crate::zcode;
use crate::zngio;

/// Size of the fixed footer that follows the trailer record
pub(crate) const FOOTER_LEN: u64 = 8;

/// Describes the sections of a microindex file.
///
/// `sections` lists section byte lengths in file order: the base section
/// first, then the index levels from the top level down to level 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub magic: String,
    pub version: i64,
    pub order: Order,
    pub child_field: String,
    pub frame_thresh: usize,
    pub sections: Vec<u64>,
    pub keys: Vec<String>,
}

impl Trailer {
    pub fn new(keys: Vec<String>, order: Order, frame_thresh: usize) -> Self {
        Self {
            magic: MAGIC.to_string(),
            version: VERSION,
            order,
            child_field: CHILD_FIELD.to_string(),
            frame_thresh,
            sections: Vec::new(),
            keys,
        }
    }

    /// Combined length of all sections, which is also the trailer offset
    pub fn data_len(&self) -> u64 {
        self.sections.iter().sum()
    }

    /// Number of index levels above the base
    pub fn levels(&self) -> usize {
        self.sections.len().saturating_sub(1)
    }

    /// The trailer as a record value
    pub fn to_value(&self, zctx: &TypeContext) -> Result<Value> {
        let mut sections = Vec::new();
        for s in &self.sections {
            zcode::append_primitive(&mut sections, Some(encode_int(*s as i64).as_slice()));
        }
        let mut keys = Vec::new();
        for k in &self.keys {
            zcode::append_primitive(&mut keys, Some(k.as_bytes()));
        }
        Value::record(
            zctx,
            vec![
                ("magic", Value::string(&self.magic)),
                ("version", Value::int64(self.version)),
                ("descending", Value::bool(self.order.is_desc())),
                ("child_field", Value::string(&self.child_field)),
                ("frame_thresh", Value::int64(self.frame_thresh as i64)),
                ("sections", typed_array(zctx, Type::int64(), sections)),
                ("keys", typed_array(zctx, Type::string(), keys)),
            ],
        )
    }

    /// Parse a trailer record, checking magic and version
    pub fn from_value(v: &Value) -> Result<Self> {
        let magic = v.field("magic").and_then(|m| m.as_str().map(str::to_string));
        if magic.as_deref() != Some(MAGIC) {
            return Err(IndexError::NotIndex.into());
        }
        let version = int_field(v, "version")?;
        if version != VERSION {
            return Err(IndexError::BadVersion { found: version }.into());
        }
        let descending = v
            .field("descending")
            .and_then(|d| d.as_bool())
            .ok_or_else(|| missing("descending"))?;
        let child_field = v
            .field("child_field")
            .and_then(|c| c.as_str().map(str::to_string))
            .ok_or_else(|| missing("child_field"))?;
        let frame_thresh = int_field(v, "frame_thresh")?;
        let sections = v
            .field("sections")
            .ok_or_else(|| missing("sections"))?
            .elements()?
            .iter()
            .map(|s| match s.as_int() {
                Some(n) if n >= 0 => Ok(n as u64),
                _ => Err(Error::from(IndexError::Corrupt(format!("bad section length {}", s)))),
            })
            .collect::<Result<Vec<u64>>>()?;
        let keys = v
            .field("keys")
            .ok_or_else(|| missing("keys"))?
            .elements()?
            .iter()
            .map(|k| {
                k.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::from(IndexError::Corrupt(format!("bad key name {}", k))))
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(Self {
            magic: MAGIC.to_string(),
            version,
            order: if descending { Order::Desc } else { Order::Asc },
            child_field,
            frame_thresh: usize::try_from(frame_thresh).unwrap_or(FRAME_THRESH),
            sections,
            keys,
        })
    }

    /// Serialize the trailer record followed by the footer
    pub fn encode(&self, zctx: &TypeContext) -> Result<Vec<u8>> {
        let mut w = zngio::Writer::new(Vec::new());
        w.write(&self.to_value(zctx)?)?;
        w.end_stream()?;
        let mut buf = w.into_inner();
        let len = buf.len() as u32;
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Read the trailer from the end of a microindex file of `file_len`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::NotIndex` if the file is too short to hold a
    /// footer, and `IndexError::Checksum` if the trailer bytes do not match
    /// the footer checksum.
    pub fn read<R: Read + Seek>(r: &mut R, file_len: u64, zctx: &TypeContext) -> Result<Self> {
        if file_len < FOOTER_LEN {
            return Err(IndexError::NotIndex.into());
        }
        let mut footer = [0u8; FOOTER_LEN as usize];
        r.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
        r.read_exact(&mut footer)?;
        let len = u64::from(u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]));
        let crc = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
        if len + FOOTER_LEN > file_len {
            return Err(IndexError::NotIndex.into());
        }
        let mut buf = vec![0u8; len as usize];
        r.seek(SeekFrom::Start(file_len - FOOTER_LEN - len))?;
        r.read_exact(&mut buf)?;
        if crc32fast::hash(&buf) != crc {
            return Err(IndexError::Checksum.into());
        }
        let rec = zngio::Reader::new(&buf[..], zctx.clone())
            .read()
            .map_err(|_| IndexError::NotIndex)?
            .ok_or(IndexError::NotIndex)?;
        let trailer = Self::from_value(&rec)?;
        if trailer.data_len() + len + FOOTER_LEN != file_len {
            return Err(IndexError::Corrupt(format!(
                "sections cover {} bytes but the trailer starts at {}",
                trailer.data_len(),
                file_len - FOOTER_LEN - len
            ))
            .into());
        }
        Ok(trailer)
    }
}

fn typed_array(zctx: &TypeContext, inner: Type, body: Vec<u8>) -> Value {
    Value::new(zctx.lookup_array(inner), Some(Bytes::from(body)))
}

fn int_field(v: &Value, name: &str) -> Result<i64> {
    v.field(name)
        .and_then(|f| f.as_int())
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> Error {
    IndexError::Corrupt(format!("trailer field \"{}\" missing or mistyped", name)).into()
}
