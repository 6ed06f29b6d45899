use std::collections::HashMap;
use std::io::Write;

use super::*;
use crate::error::Result;
use crate::value::{Type, TypeDesc, Value, PRIMITIVE_COUNT};
use crate::zcode::append_uvarint;

/// Writes values as a self-describing stream.
///
/// Typedefs are emitted lazily the first time a type is written after the
/// start of the stream or the last `end_stream`.
pub struct Writer<W: Write> {
    w: W,
    local: HashMap<Type, u32>,
    next_id: u32,
    position: u64,
    buf: Vec<u8>,
}

impl<W: Write> Writer<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            local: HashMap::new(),
            next_id: PRIMITIVE_COUNT,
            position: 0,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write(&mut self, v: &Value) -> Result<()> {
        let id = self.bind(v.ty())?;
        self.buf.clear();
        self.buf.push(MSG_VALUE);
        append_uvarint(&mut self.buf, u64::from(id));
        v.encode(&mut self.buf);
        self.emit()
    }

    /// Terminate the current stream; later values start a fresh type table
    pub fn end_stream(&mut self) -> Result<()> {
        self.buf.clear();
        self.buf.push(MSG_EOS);
        self.emit()?;
        self.local.clear();
        self.next_id = PRIMITIVE_COUNT;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    fn emit(&mut self) -> Result<()> {
        self.w.write_all(&self.buf)?;
        self.position += self.buf.len() as u64;
        Ok(())
    }

    /// Local id of `ty`, emitting typedefs for it and its children as needed
    fn bind(&mut self, ty: &Type) -> Result<u32> {
        if let TypeDesc::Primitive(p) = ty.desc() {
            return Ok(*p as u32);
        }
        if let Some(id) = self.local.get(ty) {
            return Ok(*id);
        }
        let mut def = Vec::new();
        match ty.desc() {
            TypeDesc::Primitive(_) => unreachable!("primitives are bound above"),
            TypeDesc::Record(fields) => {
                def.push(KIND_RECORD);
                append_uvarint(&mut def, fields.len() as u64);
                for f in fields {
                    let id = self.bind(&f.ty)?;
                    append_name(&mut def, &f.name);
                    append_uvarint(&mut def, u64::from(id));
                }
            }
            TypeDesc::Array(inner) | TypeDesc::Set(inner) => {
                let kind = if matches!(ty.desc(), TypeDesc::Array(_)) {
                    KIND_ARRAY
                } else {
                    KIND_SET
                };
                let id = self.bind(inner)?;
                def.push(kind);
                append_uvarint(&mut def, u64::from(id));
            }
            TypeDesc::Map(k, v) => {
                let kid = self.bind(k)?;
                let vid = self.bind(v)?;
                def.push(KIND_MAP);
                append_uvarint(&mut def, u64::from(kid));
                append_uvarint(&mut def, u64::from(vid));
            }
            TypeDesc::Union(types) => {
                let ids = types
                    .iter()
                    .map(|t| self.bind(t))
                    .collect::<Result<Vec<_>>>()?;
                def.push(KIND_UNION);
                append_uvarint(&mut def, ids.len() as u64);
                for id in ids {
                    append_uvarint(&mut def, u64::from(id));
                }
            }
            TypeDesc::Enum(symbols) => {
                def.push(KIND_ENUM);
                append_uvarint(&mut def, symbols.len() as u64);
                for s in symbols {
                    append_name(&mut def, s);
                }
            }
            TypeDesc::Named(name, inner) => {
                let id = self.bind(inner)?;
                def.push(KIND_NAMED);
                append_name(&mut def, name);
                append_uvarint(&mut def, u64::from(id));
            }
        }
        self.buf.clear();
        self.buf.push(MSG_TYPEDEF);
        self.buf.extend_from_slice(&def);
        self.emit()?;
        let id = self.next_id;
        self.next_id += 1;
        self.local.insert(ty.clone(), id);
        Ok(id)
    }
}

fn append_name(dst: &mut Vec<u8>, name: &str) {
    append_uvarint(dst, name.len() as u64);
    dst.extend_from_slice(name.as_bytes());
}
