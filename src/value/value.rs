use bytes::Bytes;

use super::context::TypeContext;
use super::primitive::{
    decode_bool, decode_float, decode_int, decode_string, decode_uint, encode_bool,
    encode_float, encode_int, encode_uint,
};
use super::types::{Field, Primitive, Type, TypeDesc};
use crate::error::{Error, Result};
use crate::zcode::{self, Builder, Iter};

/// A typed value: a type handle plus the encoded body.
///
/// A value whose body is `None` is the null of its type. Bodies are
/// reference-counted slices, so field access and element iteration share
/// the bytes of the enclosing value instead of copying them.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Value {
    ty: Type,
    bytes: Option<Bytes>,
}

impl Value {
    pub fn new(ty: Type, bytes: Option<Bytes>) -> Self {
        Self { ty, bytes }
    }

    /// The null of the given type
    pub fn null_of(ty: Type) -> Self {
        Self { ty, bytes: None }
    }

    /// Untyped null
    pub fn null() -> Self {
        Self::null_of(Type::null())
    }

    pub fn bool(v: bool) -> Self {
        Self::primitive(Type::bool(), encode_bool(v))
    }

    pub fn int64(v: i64) -> Self {
        Self::primitive(Type::int64(), encode_int(v))
    }

    pub fn uint64(v: u64) -> Self {
        Self::primitive(Type::uint64(), encode_uint(v))
    }

    pub fn float64(v: f64) -> Self {
        Self::primitive(Type::float64(), encode_float(v))
    }

    pub fn string(v: impl AsRef<str>) -> Self {
        Self::primitive(Type::string(), v.as_ref().as_bytes().to_vec())
    }

    pub fn bytes_value(v: impl AsRef<[u8]>) -> Self {
        Self::primitive(Type::bytes(), v.as_ref().to_vec())
    }

    /// A time given as nanoseconds since the Unix epoch
    pub fn time(nanos: i64) -> Self {
        Self::primitive(Type::time(), encode_int(nanos))
    }

    pub fn duration(nanos: i64) -> Self {
        Self::primitive(Type::duration(), encode_int(nanos))
    }

    fn primitive(ty: Type, body: Vec<u8>) -> Self {
        Self {
            ty,
            bytes: Some(Bytes::from(body)),
        }
    }

    /// Build a record from `(name, value)` pairs, interning its type
    pub fn record<S: Into<String>>(zctx: &TypeContext, fields: Vec<(S, Value)>) -> Result<Self> {
        let mut types = Vec::with_capacity(fields.len());
        let mut b = Builder::new();
        for (name, v) in fields {
            b.append(v.body(), v.ty.is_container());
            types.push(Field::new(name, v.ty));
        }
        let ty = zctx.lookup_record(types)?;
        Ok(Self {
            ty,
            bytes: Some(Bytes::from(b.into_bytes())),
        })
    }

    /// Build a record of a known record type from its field values, in order
    pub fn record_of(ty: Type, values: &[Value]) -> Result<Self> {
        let fields = ty
            .fields()
            .ok_or_else(|| Error::invalid(format!("{} is not a record type", ty)))?;
        if fields.len() != values.len() {
            return Err(Error::invalid(format!(
                "record type {} has {} fields, got {} values",
                ty,
                fields.len(),
                values.len()
            )));
        }
        let mut b = Builder::new();
        for (f, v) in fields.iter().zip(values) {
            b.append(v.body(), f.ty.is_container());
        }
        Ok(Self {
            ty,
            bytes: Some(Bytes::from(b.into_bytes())),
        })
    }

    /// Build an array. Elements of differing types become members of a
    /// union element type; an empty array has element type null.
    pub fn array(zctx: &TypeContext, elems: Vec<Value>) -> Result<Self> {
        let (inner, body) = Self::encode_elements(zctx, &elems)?;
        Ok(Self {
            ty: zctx.lookup_array(inner),
            bytes: Some(Bytes::from(body)),
        })
    }

    /// Build a set. Elements are sorted by body and deduplicated.
    pub fn set(zctx: &TypeContext, mut elems: Vec<Value>) -> Result<Self> {
        elems.sort_by(|a, b| a.bytes.cmp(&b.bytes));
        elems.dedup();
        let (inner, body) = Self::encode_elements(zctx, &elems)?;
        Ok(Self {
            ty: zctx.lookup_set(inner),
            bytes: Some(Bytes::from(body)),
        })
    }

    /// Build a map from key/value entries of uniform types
    pub fn map(zctx: &TypeContext, key: Type, val: Type, entries: Vec<(Value, Value)>) -> Result<Self> {
        let mut b = Builder::new();
        for (k, v) in entries {
            if k.ty != key || v.ty != val {
                return Err(Error::invalid(format!(
                    "map entry {}:{} does not match |{{{}:{}}}|",
                    k.ty, v.ty, key, val
                )));
            }
            b.append(k.body(), key.is_container());
            b.append(v.body(), val.is_container());
        }
        Ok(Self {
            ty: zctx.lookup_map(key, val),
            bytes: Some(Bytes::from(b.into_bytes())),
        })
    }

    fn encode_elements(zctx: &TypeContext, elems: &[Value]) -> Result<(Type, Vec<u8>)> {
        let mut members: Vec<Type> = Vec::new();
        for e in elems {
            if !members.contains(&e.ty) {
                members.push(e.ty.clone());
            }
        }
        let mut b = Builder::new();
        match members.len() {
            0 => Ok((Type::null(), Vec::new())),
            1 => {
                let container = members[0].is_container();
                for e in elems {
                    b.append(e.body(), container);
                }
                Ok((members.swap_remove(0), b.into_bytes()))
            }
            _ => {
                let union = zctx.lookup_union(members.clone())?;
                for e in elems {
                    let sel = members.iter().position(|t| *t == e.ty).unwrap_or(0);
                    append_union(&mut b, sel, e);
                }
                Ok((union, b.into_bytes()))
            }
        }
    }

    /// Wrap `v` as a value of the union type `union`
    pub fn union_of(union: Type, v: &Value) -> Result<Self> {
        let sel = match union.under().desc() {
            TypeDesc::Union(types) => types.iter().position(|t| *t == v.ty),
            _ => None,
        }
        .ok_or_else(|| Error::invalid(format!("{} is not a member of {}", v.ty, union)))?;
        let mut body = Vec::new();
        zcode::append_primitive(&mut body, Some(&encode_uint(sel as u64)));
        v.encode(&mut body);
        Ok(Self {
            ty: union,
            bytes: Some(Bytes::from(body)),
        })
    }

    /// Symbol of an enum type by name
    pub fn enum_symbol(ty: Type, symbol: &str) -> Result<Self> {
        let idx = match ty.under().desc() {
            TypeDesc::Enum(symbols) => symbols.iter().position(|s| s == symbol),
            _ => None,
        }
        .ok_or_else(|| Error::invalid(format!("\"{}\" is not a symbol of {}", symbol, ty)))?;
        Ok(Self::primitive(ty, encode_uint(idx as u64)))
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The encoded body, or `None` for null
    pub fn body(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    /// Retype this value without touching its body
    pub fn with_type(self, ty: Type) -> Self {
        Self { ty, ..self }
    }

    /// Append this value, tag included, to `dst`
    pub fn encode(&self, dst: &mut Vec<u8>) {
        zcode::append(dst, self.body(), self.ty.is_container());
    }

    fn sub(&self, ty: Type, body: Option<&[u8]>) -> Value {
        let bytes = match (body, &self.bytes) {
            (Some(b), Some(parent)) => Some(parent.slice_ref(b)),
            (Some(b), None) => Some(Bytes::copy_from_slice(b)),
            (None, _) => None,
        };
        Value { ty, bytes }
    }

    // Typed accessors. Each returns `None` for null or for a value of
    // another type.

    pub fn as_bool(&self) -> Option<bool> {
        match self.ty.as_primitive()? {
            Primitive::Bool => decode_bool(self.body()?).ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.ty.as_primitive()? {
            Primitive::Int64 | Primitive::Time | Primitive::Duration => {
                decode_int(self.body()?).ok()
            }
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self.ty.as_primitive()? {
            Primitive::Uint64 => decode_uint(self.body()?).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.ty.as_primitive()? {
            Primitive::Float64 => decode_float(self.body()?).ok(),
            _ => None,
        }
    }

    /// Numeric value widened to f64
    pub fn as_f64_lossy(&self) -> Option<f64> {
        match self.ty.as_primitive()? {
            Primitive::Int64 => self.as_int().map(|v| v as f64),
            Primitive::Uint64 => self.as_uint().map(|v| v as f64),
            Primitive::Float64 => self.as_float(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.ty.as_primitive()? {
            Primitive::String => decode_string(self.body()?).ok(),
            _ => None,
        }
    }

    /// Field of a record by name. A null record yields the null of the
    /// field's type.
    pub fn field(&self, name: &str) -> Option<Value> {
        let idx = self.ty.field_index(name)?;
        self.field_at(idx).ok()
    }

    /// Field of a record by position
    pub fn field_at(&self, idx: usize) -> Result<Value> {
        let fields = self
            .ty
            .fields()
            .ok_or_else(|| Error::invalid(format!("{} is not a record", self.ty)))?;
        let field = fields
            .get(idx)
            .ok_or_else(|| Error::invalid(format!("field index {} out of range", idx)))?;
        let body = match self.body() {
            None => return Ok(Value::null_of(field.ty.clone())),
            Some(b) => b,
        };
        let mut it = Iter::new(body);
        for _ in 0..idx {
            it.next_slot()?;
        }
        let slot = it.next_slot()?;
        Ok(self.sub(field.ty.clone(), slot.body))
    }

    /// All `(name, value)` pairs of a record
    pub fn fields(&self) -> Result<Vec<(String, Value)>> {
        let fields = self
            .ty
            .fields()
            .ok_or_else(|| Error::invalid(format!("{} is not a record", self.ty)))?;
        let body = match self.body() {
            None => {
                return Ok(fields
                    .iter()
                    .map(|f| (f.name.clone(), Value::null_of(f.ty.clone())))
                    .collect())
            }
            Some(b) => b,
        };
        let mut out = Vec::with_capacity(fields.len());
        let mut it = Iter::new(body);
        for f in fields {
            let slot = it.next_slot()?;
            out.push((f.name.clone(), self.sub(f.ty.clone(), slot.body)));
        }
        Ok(out)
    }

    /// Follow a dotted path of field names. Any missing step yields `None`.
    pub fn deref_path<S: AsRef<str>>(&self, path: &[S]) -> Option<Value> {
        let mut cur = self.clone();
        for name in path {
            cur = cur.field(name.as_ref())?;
        }
        Some(cur)
    }

    /// Elements of an array or set. Union elements are unwrapped to their
    /// member values.
    pub fn elements(&self) -> Result<Vec<Value>> {
        let inner = self
            .ty
            .inner()
            .ok_or_else(|| Error::invalid(format!("{} is not an array or set", self.ty)))?
            .clone();
        let body = match self.body() {
            None => return Ok(Vec::new()),
            Some(b) => b,
        };
        let mut out = Vec::new();
        for slot in Iter::new(body) {
            let elem = self.sub(inner.clone(), slot?.body);
            out.push(elem.unwrap_union()?);
        }
        Ok(out)
    }

    /// Key/value entries of a map
    pub fn map_entries(&self) -> Result<Vec<(Value, Value)>> {
        let (kt, vt) = match self.ty.under().desc() {
            TypeDesc::Map(k, v) => (k.clone(), v.clone()),
            _ => return Err(Error::invalid(format!("{} is not a map", self.ty))),
        };
        let body = match self.body() {
            None => return Ok(Vec::new()),
            Some(b) => b,
        };
        let mut out = Vec::new();
        let mut it = Iter::new(body);
        while !it.done() {
            let k = it.next_slot()?;
            let v = it.next_slot()?;
            out.push((self.sub(kt.clone(), k.body), self.sub(vt.clone(), v.body)));
        }
        Ok(out)
    }

    /// For a union value, the member value it holds; otherwise `self`
    pub fn unwrap_union(self) -> Result<Value> {
        let types = match self.ty.under().desc() {
            TypeDesc::Union(types) => types.clone(),
            _ => return Ok(self),
        };
        let body = match self.body() {
            None => return Ok(Value::null()),
            Some(b) => b,
        };
        let mut it = Iter::new(body);
        let sel = decode_uint(it.next_slot()?.body.unwrap_or_default())? as usize;
        let ty = types
            .get(sel)
            .ok_or_else(|| Error::invalid(format!("union selector {} out of range", sel)))?
            .clone();
        let slot = it.next_slot()?;
        Ok(self.sub(ty, slot.body))
    }

    /// Symbol name of an enum value
    pub fn enum_name(&self) -> Option<&str> {
        match self.ty.under().desc() {
            TypeDesc::Enum(symbols) => {
                let idx = decode_uint(self.body()?).ok()? as usize;
                symbols.get(idx).map(|s| s.as_str())
            }
            _ => None,
        }
    }

    /// Returns the truthiness of a bool value; anything else is false
    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }
}

fn append_union(b: &mut Builder, sel: usize, v: &Value) {
    b.begin_container();
    b.append_primitive(Some(&encode_uint(sel as u64)));
    b.append(v.body(), v.ty().is_container());
    b.end_container();
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({})", self)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_access() {
        let zctx = TypeContext::new();
        let inner = Value::record(&zctx, vec![("b", Value::string("x"))]).unwrap();
        let rec = Value::record(&zctx, vec![("v", Value::int64(-7)), ("a", inner)]).unwrap();
        assert_eq!(rec.field("v").unwrap().as_int(), Some(-7));
        assert_eq!(
            rec.deref_path(&["a", "b"]).unwrap().as_str(),
            Some("x")
        );
        assert!(rec.deref_path(&["a", "c"]).is_none());
        assert!(rec.field("missing").is_none());
    }

    #[test]
    fn test_null_record_fields_are_typed_nulls() {
        let zctx = TypeContext::new();
        let rec = Value::record(&zctx, vec![("v", Value::int64(1))]).unwrap();
        let null = Value::null_of(rec.ty().clone());
        let v = null.field("v").unwrap();
        assert!(v.is_null());
        assert_eq!(v.ty(), &Type::int64());
    }

    #[test]
    fn test_heterogeneous_array_uses_union() {
        let zctx = TypeContext::new();
        let arr = Value::array(&zctx, vec![Value::int64(1), Value::string("a")]).unwrap();
        assert!(matches!(
            arr.ty().inner().unwrap().desc(),
            TypeDesc::Union(_)
        ));
        let elems = arr.elements().unwrap();
        assert_eq!(elems[0].as_int(), Some(1));
        assert_eq!(elems[1].as_str(), Some("a"));
    }

    #[test]
    fn test_set_dedups() {
        let zctx = TypeContext::new();
        let set = Value::set(
            &zctx,
            vec![Value::int64(2), Value::int64(1), Value::int64(2)],
        )
        .unwrap();
        assert_eq!(set.elements().unwrap().len(), 2);
    }

    #[test]
    fn test_map_entries() {
        let zctx = TypeContext::new();
        let m = Value::map(
            &zctx,
            Type::string(),
            Type::int64(),
            vec![(Value::string("a"), Value::int64(1))],
        )
        .unwrap();
        let entries = m.map_entries().unwrap();
        assert_eq!(entries[0].0.as_str(), Some("a"));
        assert_eq!(entries[0].1.as_int(), Some(1));
    }

    #[test]
    fn test_enum_symbol() {
        let zctx = TypeContext::new();
        let ty = zctx
            .lookup_enum(vec!["low".into(), "high".into()])
            .unwrap();
        let v = Value::enum_symbol(ty, "high").unwrap();
        assert_eq!(v.enum_name(), Some("high"));
    }

    #[test]
    fn test_field_shares_parent_bytes() {
        let zctx = TypeContext::new();
        let rec = Value::record(&zctx, vec![("s", Value::string("shared"))]).unwrap();
        let s = rec.field("s").unwrap();
        let parent = rec.body().unwrap().as_ptr_range();
        assert!(parent.contains(&s.body().unwrap().as_ptr()));
    }
}
