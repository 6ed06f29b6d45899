//! Value model
//!
//! Self-describing values: a `Type` interned in a `TypeContext` plus a body
//! in the tagged byte encoding of `crate::zcode`.

pub mod compare;
mod context;
mod format;
mod path;
pub mod primitive;
mod types;
#[allow(clippy::module_inception)]
mod value;

pub use compare::{compare_tuples, compare_values, Comparator, Nulls, Order, SortKey};
pub use context::TypeContext;
pub use path::Path;
pub use types::{Field, Primitive, Type, TypeDesc, PRIMITIVE_COUNT};
pub use value::Value;
