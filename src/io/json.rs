//! JSON bridge
//!
//! Objects become records with their field order preserved. Integers
//! that fit an int64 are int64, larger ones uint64, everything else
//! float64. Arrays whose elements differ in type get a union element
//! type.

use std::io::{BufRead, Write};

use serde_json::{Map, Number, Value as Json};

use super::ValueWriter;
use crate::error::{Error, Result};
use crate::value::{Primitive, TypeContext, TypeDesc, Value};

pub fn from_json(zctx: &TypeContext, j: &Json) -> Result<Value> {
    Ok(match j {
        Json::Null => Value::null(),
        Json::Bool(b) => Value::bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::int64(i)
            } else if let Some(u) = n.as_u64() {
                Value::uint64(u)
            } else {
                Value::float64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::string(s),
        Json::Array(elems) => {
            let vals = elems
                .iter()
                .map(|e| from_json(zctx, e))
                .collect::<Result<Vec<_>>>()?;
            Value::array(zctx, vals)?
        }
        Json::Object(obj) => {
            let fields = obj
                .iter()
                .map(|(k, v)| Ok((k.clone(), from_json(zctx, v)?)))
                .collect::<Result<Vec<(String, Value)>>>()?;
            Value::record(zctx, fields)?
        }
    })
}

pub fn to_json(v: &Value) -> Result<Json> {
    if v.is_null() {
        return Ok(Json::Null);
    }
    let ty = v.ty().under();
    Ok(match ty.desc() {
        TypeDesc::Primitive(p) => match p {
            Primitive::Null => Json::Null,
            Primitive::Bool => Json::Bool(v.is_true()),
            Primitive::Int64 => v.as_int().map(Json::from).unwrap_or(Json::Null),
            Primitive::Uint64 => v.as_uint().map(Json::from).unwrap_or(Json::Null),
            Primitive::Float64 => v
                .as_float()
                .and_then(Number::from_f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Primitive::String => Json::String(v.as_str().unwrap_or_default().to_string()),
            Primitive::Bytes | Primitive::Time | Primitive::Duration => Json::String(v.to_string()),
        },
        TypeDesc::Record(_) => {
            let mut obj = Map::new();
            for (name, fv) in v.fields()? {
                obj.insert(name, to_json(&fv)?);
            }
            Json::Object(obj)
        }
        TypeDesc::Array(_) | TypeDesc::Set(_) => Json::Array(
            v.elements()?
                .iter()
                .map(to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        TypeDesc::Map(_, _) => {
            let mut entries = Vec::new();
            for (k, val) in v.map_entries()? {
                let mut obj = Map::new();
                obj.insert("key".to_string(), to_json(&k)?);
                obj.insert("value".to_string(), to_json(&val)?);
                entries.push(Json::Object(obj));
            }
            Json::Array(entries)
        }
        TypeDesc::Union(_) => to_json(&v.clone().unwrap_union()?)?,
        TypeDesc::Enum(_) => Json::String(v.enum_name().unwrap_or_default().to_string()),
        TypeDesc::Named(_, _) => return Err(Error::invalid(format!("unresolved named type {}", ty))),
    })
}

/// Reads newline-delimited JSON objects as records; blank lines are
/// skipped
pub struct NdjsonReader<R: BufRead> {
    r: R,
    zctx: TypeContext,
    line: String,
    lineno: usize,
}

impl<R: BufRead> NdjsonReader<R> {
    pub fn new(r: R, zctx: &TypeContext) -> Self {
        Self {
            r,
            zctx: zctx.clone(),
            line: String::new(),
            lineno: 0,
        }
    }

    pub fn read(&mut self) -> Result<Option<Value>> {
        loop {
            self.line.clear();
            if self.r.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.lineno += 1;
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            let j: Json = serde_json::from_str(text)
                .map_err(|e| Error::invalid(format!("line {}: {}", self.lineno, e)))?;
            if !j.is_object() {
                return Err(Error::invalid(format!("line {}: expected a JSON object", self.lineno)));
            }
            return from_json(&self.zctx, &j).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for NdjsonReader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Writes one JSON document per line
pub struct JsonWriter<W: Write> {
    w: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write> ValueWriter for JsonWriter<W> {
    fn write(&mut self, v: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.w, &to_json(v)?)
            .map_err(|e| Error::from_cause(crate::error::ErrorKind::Other, e))?;
        self.w.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_field_order_preserved() {
        let zctx = TypeContext::new();
        let j: Json = serde_json::from_str(r#"{"z":1,"a":"x","m":[1,2]}"#).unwrap();
        let v = from_json(&zctx, &j).unwrap();
        assert_eq!(v.to_string(), r#"{z:1,a:"x",m:[1,2]}"#);
        assert_eq!(to_json(&v).unwrap(), j);
    }

    #[test]
    fn test_heterogeneous_array_is_a_union() {
        let zctx = TypeContext::new();
        let j: Json = serde_json::from_str(r#"[1,"two",null]"#).unwrap();
        let v = from_json(&zctx, &j).unwrap();
        assert!(matches!(v.ty().inner().unwrap().desc(), TypeDesc::Union(_)));
        assert_eq!(to_json(&v).unwrap(), j);
    }

    #[test]
    fn test_number_mapping() {
        let zctx = TypeContext::new();
        let big: Json = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(from_json(&zctx, &big).unwrap().as_uint(), Some(u64::MAX));
        let f: Json = serde_json::from_str("1.5").unwrap();
        assert_eq!(from_json(&zctx, &f).unwrap().as_float(), Some(1.5));
    }

    #[test]
    fn test_ndjson_reader_and_writer() {
        let zctx = TypeContext::new();
        let input = "{\"k\":1}\n\n{\"k\":2}\n";
        let vals: Vec<Value> = NdjsonReader::new(input.as_bytes(), &zctx)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(vals.len(), 2);
        let mut w = JsonWriter::new(Vec::new());
        for v in &vals {
            w.write(v).unwrap();
        }
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "{\"k\":1}\n{\"k\":2}\n");
    }

    #[test]
    fn test_ndjson_rejects_non_objects() {
        let zctx = TypeContext::new();
        let mut r = NdjsonReader::new("[1]\n".as_bytes(), &zctx);
        let err = r.read().unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
