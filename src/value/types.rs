//! Type descriptors
//!
//! A `Type` is a cheap handle onto an interned descriptor. Two handles are
//! equal exactly when they name the same interned descriptor, so equality is
//! a pointer comparison.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Primitive type codes. The discriminant doubles as the type id of the
/// primitive in every `TypeContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Null = 0,
    Bool = 1,
    Int64 = 2,
    Uint64 = 3,
    Float64 = 4,
    String = 5,
    Bytes = 6,
    Time = 7,
    Duration = 8,
}

/// Number of primitive ids reserved at the bottom of every type context
pub const PRIMITIVE_COUNT: u32 = 9;

impl Primitive {
    pub const ALL: [Primitive; PRIMITIVE_COUNT as usize] = [
        Primitive::Null,
        Primitive::Bool,
        Primitive::Int64,
        Primitive::Uint64,
        Primitive::Float64,
        Primitive::String,
        Primitive::Bytes,
        Primitive::Time,
        Primitive::Duration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Bool => "bool",
            Primitive::Int64 => "int64",
            Primitive::Uint64 => "uint64",
            Primitive::Float64 => "float64",
            Primitive::String => "string",
            Primitive::Bytes => "bytes",
            Primitive::Time => "time",
            Primitive::Duration => "duration",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn from_id(id: u32) -> Option<Primitive> {
        Primitive::ALL.get(id as usize).copied()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Primitive::Int64 | Primitive::Uint64 | Primitive::Float64
        )
    }
}

/// A named field of a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Structural description of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Primitive(Primitive),
    Record(Vec<Field>),
    Array(Type),
    Set(Type),
    Map(Type, Type),
    Union(Vec<Type>),
    Enum(Vec<String>),
    Named(String, Type),
}

pub(crate) struct TypeInner {
    pub(crate) id: u32,
    pub(crate) desc: TypeDesc,
}

/// Handle onto an interned type
#[derive(Clone)]
pub struct Type(pub(crate) Arc<TypeInner>);

fn primitives() -> &'static [Type] {
    static PRIMS: OnceLock<Vec<Type>> = OnceLock::new();
    PRIMS.get_or_init(|| {
        Primitive::ALL
            .iter()
            .map(|p| {
                Type(Arc::new(TypeInner {
                    id: *p as u32,
                    desc: TypeDesc::Primitive(*p),
                }))
            })
            .collect()
    })
}

impl Type {
    /// The shared handle of a primitive type
    pub fn primitive(p: Primitive) -> Type {
        primitives()[p as usize].clone()
    }

    pub fn null() -> Type {
        Self::primitive(Primitive::Null)
    }
    pub fn bool() -> Type {
        Self::primitive(Primitive::Bool)
    }
    pub fn int64() -> Type {
        Self::primitive(Primitive::Int64)
    }
    pub fn uint64() -> Type {
        Self::primitive(Primitive::Uint64)
    }
    pub fn float64() -> Type {
        Self::primitive(Primitive::Float64)
    }
    pub fn string() -> Type {
        Self::primitive(Primitive::String)
    }
    pub fn bytes() -> Type {
        Self::primitive(Primitive::Bytes)
    }
    pub fn time() -> Type {
        Self::primitive(Primitive::Time)
    }
    pub fn duration() -> Type {
        Self::primitive(Primitive::Duration)
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn desc(&self) -> &TypeDesc {
        &self.0.desc
    }

    /// The type beneath any chain of named aliases
    pub fn under(&self) -> &Type {
        let mut t = self;
        while let TypeDesc::Named(_, inner) = t.desc() {
            t = inner;
        }
        t
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.under().desc() {
            TypeDesc::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self, p: Primitive) -> bool {
        self.as_primitive() == Some(p)
    }

    /// Container types encode their body as a sequence of tagged values.
    /// Enums encode as a primitive symbol index.
    pub fn is_container(&self) -> bool {
        matches!(
            self.under().desc(),
            TypeDesc::Record(_)
                | TypeDesc::Array(_)
                | TypeDesc::Set(_)
                | TypeDesc::Map(_, _)
                | TypeDesc::Union(_)
        )
    }

    pub fn is_record(&self) -> bool {
        matches!(self.under().desc(), TypeDesc::Record(_))
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match self.under().desc() {
            TypeDesc::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Index of the named field in a record type
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields()?.iter().position(|f| f.name == name)
    }

    /// Element type of an array or set
    pub fn inner(&self) -> Option<&Type> {
        match self.under().desc() {
            TypeDesc::Array(t) | TypeDesc::Set(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({}: {})", self.id(), self)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.desc() {
            TypeDesc::Primitive(p) => f.write_str(p.name()),
            TypeDesc::Record(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", field.name, field.ty)?;
                }
                f.write_str("}")
            }
            TypeDesc::Array(t) => write!(f, "[{}]", t),
            TypeDesc::Set(t) => write!(f, "|[{}]|", t),
            TypeDesc::Map(k, v) => write!(f, "|{{{}:{}}}|", k, v),
            TypeDesc::Union(types) => {
                f.write_str("(")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str(")")
            }
            TypeDesc::Enum(symbols) => write!(f, "enum({})", symbols.join(",")),
            TypeDesc::Named(name, _) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_handles_are_shared() {
        assert_eq!(Type::int64(), Type::primitive(Primitive::Int64));
        assert_ne!(Type::int64(), Type::uint64());
        assert_eq!(Type::string().id(), Primitive::String as u32);
    }

    #[test]
    fn test_primitive_names() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
            assert_eq!(Primitive::from_id(p as u32), Some(p));
        }
        assert_eq!(Primitive::from_name("ip"), None);
    }
}
