use std::io::{ErrorKind as IoErrorKind, Read};

use bytes::Bytes;

use super::*;
use crate::error::{Error, Result};
use crate::value::{Field, Type, TypeContext, Value, PRIMITIVE_COUNT};
use crate::zcode::{read_uvarint, DecodeError};

/// Reads a self-describing stream, interning its types in a shared context
pub struct Reader<R: Read> {
    r: R,
    zctx: TypeContext,
    local: Vec<Type>,
    position: u64,
}

impl<R: Read> Reader<R> {
    pub fn new(r: R, zctx: TypeContext) -> Self {
        Self {
            r,
            zctx,
            local: Vec::new(),
            position: 0,
        }
    }

    pub fn type_context(&self) -> &TypeContext {
        &self.zctx
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Next value, or `None` at the end of the underlying reader.
    /// End-of-stream markers are consumed transparently.
    pub fn read(&mut self) -> Result<Option<Value>> {
        loop {
            let code = match self.read_code()? {
                None => return Ok(None),
                Some(c) => c,
            };
            match code {
                MSG_VALUE => {
                    let id = self.read_uvarint()?;
                    let ty = self.lookup(id)?;
                    let tag = self.read_uvarint()?;
                    if tag <= 1 {
                        return Ok(Some(Value::null_of(ty)));
                    }
                    let len = ((tag >> 1) - 1) as usize;
                    let body = self.read_bytes(len)?;
                    return Ok(Some(Value::new(ty, Some(Bytes::from(body)))));
                }
                MSG_TYPEDEF => self.read_typedef()?,
                MSG_EOS => self.local.clear(),
                other => {
                    return Err(Error::invalid(format!(
                        "unknown message code 0x{:02x} at offset {}",
                        other,
                        self.position - 1
                    )))
                }
            }
        }
    }

    fn read_code(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.r.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(b[0]));
                }
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        match self.read_code()? {
            Some(b) => Ok(b),
            None => Err(DecodeError::TruncatedVarint.into()),
        }
    }

    fn read_uvarint(&mut self) -> Result<u64> {
        let mut buf = [0u8; 10];
        for i in 0..buf.len() {
            buf[i] = self.read_byte()?;
            if buf[i] < 0x80 {
                return Ok(read_uvarint(&buf[..=i])?.0);
            }
        }
        Err(DecodeError::VarintOverflow.into())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::invalid(format!(
                "message of {} bytes exceeds limit of {}",
                len, MAX_MESSAGE_SIZE
            )));
        }
        let mut body = vec![0u8; len];
        self.r.read_exact(&mut body)?;
        self.position += len as u64;
        Ok(body)
    }

    fn read_name(&mut self) -> Result<String> {
        let len = self.read_uvarint()? as usize;
        let raw = self.read_bytes(len)?;
        String::from_utf8(raw).map_err(|e| Error::invalid(format!("malformed type name: {}", e)))
    }

    fn lookup(&self, id: u64) -> Result<Type> {
        if id < u64::from(PRIMITIVE_COUNT) {
            return self
                .zctx
                .lookup(id as u32)
                .ok_or_else(|| Error::invalid(format!("no primitive type {}", id)));
        }
        self.local
            .get((id - u64::from(PRIMITIVE_COUNT)) as usize)
            .cloned()
            .ok_or_else(|| Error::invalid(format!("undefined local type id {}", id)))
    }

    fn read_typedef(&mut self) -> Result<()> {
        let kind = self.read_byte()?;
        let ty = match kind {
            KIND_RECORD => {
                let n = self.read_uvarint()? as usize;
                let mut fields = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let name = self.read_name()?;
                    let id = self.read_uvarint()?;
                    fields.push(Field::new(name, self.lookup(id)?));
                }
                self.zctx.lookup_record(fields)?
            }
            KIND_ARRAY => {
                let id = self.read_uvarint()?;
                self.zctx.lookup_array(self.lookup(id)?)
            }
            KIND_SET => {
                let id = self.read_uvarint()?;
                self.zctx.lookup_set(self.lookup(id)?)
            }
            KIND_MAP => {
                let k = self.read_uvarint()?;
                let v = self.read_uvarint()?;
                self.zctx.lookup_map(self.lookup(k)?, self.lookup(v)?)
            }
            KIND_UNION => {
                let n = self.read_uvarint()? as usize;
                let mut types = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let id = self.read_uvarint()?;
                    types.push(self.lookup(id)?);
                }
                self.zctx.lookup_union(types)?
            }
            KIND_ENUM => {
                let n = self.read_uvarint()? as usize;
                let mut symbols = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    symbols.push(self.read_name()?);
                }
                self.zctx.lookup_enum(symbols)?
            }
            KIND_NAMED => {
                let name = self.read_name()?;
                let id = self.read_uvarint()?;
                self.zctx.lookup_named(&name, self.lookup(id)?)?
            }
            other => {
                return Err(Error::invalid(format!("unknown typedef kind {}", other)));
            }
        };
        self.local.push(ty);
        Ok(())
    }
}
