//! Type context: interns compound types and assigns integer ids

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{Field, Primitive, Type, TypeDesc, TypeInner, PRIMITIVE_COUNT};
use crate::error::{Error, Result};

/// Structural key of a compound type, expressed over child type ids
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DescKey {
    Record(Vec<(String, u32)>),
    Array(u32),
    Set(u32),
    Map(u32, u32),
    Union(Vec<u32>),
    Enum(Vec<String>),
    Named(String, u32),
}

struct Table {
    by_id: Vec<Type>,
    by_key: HashMap<DescKey, Type>,
}

/// Shared, clonable type context.
///
/// Lookups are idempotent: asking twice for the same structure yields the
/// same `Type` handle. Reads take a shared lock; only the first lookup of a
/// new structure takes the write lock.
#[derive(Clone)]
pub struct TypeContext {
    table: Arc<RwLock<Table>>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        let by_id = Primitive::ALL.iter().map(|p| Type::primitive(*p)).collect();
        Self {
            table: Arc::new(RwLock::new(Table {
                by_id,
                by_key: HashMap::new(),
            })),
        }
    }

    /// Number of types known to the context, primitives included
    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Type with the given id
    pub fn lookup(&self, id: u32) -> Option<Type> {
        self.table.read().by_id.get(id as usize).cloned()
    }

    /// Returns true if `ty` was interned by this context
    pub fn owns(&self, ty: &Type) -> bool {
        match self.lookup(ty.id()) {
            Some(t) => t == *ty,
            None => false,
        }
    }

    fn intern(&self, key: DescKey, desc: TypeDesc) -> Type {
        if let Some(t) = self.table.read().by_key.get(&key) {
            return t.clone();
        }
        let mut table = self.table.write();
        // Another writer may have won the race between the two locks.
        if let Some(t) = table.by_key.get(&key) {
            return t.clone();
        }
        let id = table.by_id.len() as u32;
        let ty = Type(Arc::new(TypeInner { id, desc }));
        table.by_id.push(ty.clone());
        table.by_key.insert(key, ty.clone());
        tracing::trace!(id, ty = %ty, "interned type");
        ty
    }

    /// Record type with the given fields. Field names must be unique.
    pub fn lookup_record(&self, fields: Vec<Field>) -> Result<Type> {
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(Error::invalid(format!(
                    "duplicate field name \"{}\" in record type",
                    f.name
                )));
            }
        }
        let key = DescKey::Record(fields.iter().map(|f| (f.name.clone(), f.ty.id())).collect());
        Ok(self.intern(key, TypeDesc::Record(fields)))
    }

    pub fn lookup_array(&self, inner: Type) -> Type {
        self.intern(DescKey::Array(inner.id()), TypeDesc::Array(inner))
    }

    pub fn lookup_set(&self, inner: Type) -> Type {
        self.intern(DescKey::Set(inner.id()), TypeDesc::Set(inner))
    }

    pub fn lookup_map(&self, key: Type, value: Type) -> Type {
        self.intern(
            DescKey::Map(key.id(), value.id()),
            TypeDesc::Map(key, value),
        )
    }

    /// Union of at least two distinct member types
    pub fn lookup_union(&self, types: Vec<Type>) -> Result<Type> {
        if types.len() < 2 {
            return Err(Error::invalid("union type needs at least two members"));
        }
        for (i, t) in types.iter().enumerate() {
            if types[..i].contains(t) {
                return Err(Error::invalid(format!("duplicate type {} in union", t)));
            }
        }
        let key = DescKey::Union(types.iter().map(|t| t.id()).collect());
        Ok(self.intern(key, TypeDesc::Union(types)))
    }

    pub fn lookup_enum(&self, symbols: Vec<String>) -> Result<Type> {
        if symbols.is_empty() {
            return Err(Error::invalid("enum type needs at least one symbol"));
        }
        for (i, s) in symbols.iter().enumerate() {
            if symbols[..i].contains(s) {
                return Err(Error::invalid(format!("duplicate enum symbol \"{}\"", s)));
            }
        }
        let key = DescKey::Enum(symbols.clone());
        Ok(self.intern(key, TypeDesc::Enum(symbols)))
    }

    /// Named alias over `ty`. The alias is a distinct identity from `ty`.
    pub fn lookup_named(&self, name: &str, ty: Type) -> Result<Type> {
        if name.is_empty() || Primitive::from_name(name).is_some() {
            return Err(Error::invalid(format!("invalid type name \"{}\"", name)));
        }
        let key = DescKey::Named(name.to_string(), ty.id());
        Ok(self.intern(key, TypeDesc::Named(name.to_string(), ty)))
    }

    /// Re-intern a type (possibly from another context) in this one
    pub fn translate(&self, ty: &Type) -> Result<Type> {
        if ty.id() < PRIMITIVE_COUNT {
            return Ok(ty.clone());
        }
        if self.owns(ty) {
            return Ok(ty.clone());
        }
        Ok(match ty.desc() {
            TypeDesc::Primitive(p) => Type::primitive(*p),
            TypeDesc::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|f| Ok(Field::new(f.name.clone(), self.translate(&f.ty)?)))
                    .collect::<Result<Vec<_>>>()?;
                self.lookup_record(fields)?
            }
            TypeDesc::Array(t) => self.lookup_array(self.translate(t)?),
            TypeDesc::Set(t) => self.lookup_set(self.translate(t)?),
            TypeDesc::Map(k, v) => self.lookup_map(self.translate(k)?, self.translate(v)?),
            TypeDesc::Union(types) => {
                let types = types
                    .iter()
                    .map(|t| self.translate(t))
                    .collect::<Result<Vec<_>>>()?;
                self.lookup_union(types)?
            }
            TypeDesc::Enum(symbols) => self.lookup_enum(symbols.clone())?,
            TypeDesc::Named(name, t) => self.lookup_named(name, self.translate(t)?)?,
        })
    }
}

impl std::fmt::Debug for TypeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeContext").field("types", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_record_lookup_idempotent() {
        let zctx = TypeContext::new();
        let a = zctx
            .lookup_record(vec![Field::new("v", Type::int64())])
            .unwrap();
        let b = zctx
            .lookup_record(vec![Field::new("v", Type::int64())])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id(), PRIMITIVE_COUNT);
        let c = zctx
            .lookup_record(vec![Field::new("v", Type::string())])
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_field_is_invalid() {
        let zctx = TypeContext::new();
        let err = zctx
            .lookup_record(vec![
                Field::new("a", Type::int64()),
                Field::new("a", Type::string()),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_named_is_distinct_identity() {
        let zctx = TypeContext::new();
        let port = zctx.lookup_named("port", Type::uint64()).unwrap();
        assert_ne!(port, Type::uint64());
        assert_eq!(port.under(), &Type::uint64());
        assert_eq!(zctx.lookup_named("port", Type::uint64()).unwrap(), port);
    }

    #[test]
    fn test_translate_between_contexts() {
        let a = TypeContext::new();
        let b = TypeContext::new();
        let _pad = b.lookup_array(Type::bool());
        let rec = a
            .lookup_record(vec![Field::new("xs", a.lookup_array(Type::int64()))])
            .unwrap();
        let moved = b.translate(&rec).unwrap();
        assert!(b.owns(&moved));
        assert_eq!(moved.to_string(), rec.to_string());
        assert_ne!(moved.id(), rec.id());
    }

    #[test]
    fn test_concurrent_interning() {
        let zctx = TypeContext::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let zctx = zctx.clone();
                std::thread::spawn(move || zctx.lookup_set(Type::string()))
            })
            .collect();
        let types: Vec<Type> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(types.windows(2).all(|w| w[0] == w[1]));
    }
}
