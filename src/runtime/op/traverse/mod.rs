//! Value traversal: `over` and the sub-graph scopes built by
//! `over ... into (...)`

mod over;
mod scope;

pub use over::Over;
pub use scope::{Scope, ScopeSource};

use crate::batch::Frame;
use crate::error::Result;
use crate::expr::Expr;
use crate::value::{TypeDesc, Value};

/// Evaluate each expression against `this` and flatten the results:
/// arrays and sets contribute their elements, nulls contribute nothing,
/// anything else contributes itself.
pub(crate) fn unnest(exprs: &[Expr], this: &Value, vars: &Frame) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for e in exprs {
        let v = e.eval(this, vars)?;
        if v.is_null() {
            continue;
        }
        match v.ty().under().desc() {
            TypeDesc::Array(_) | TypeDesc::Set(_) => out.extend(v.elements()?),
            _ => out.push(v),
        }
    }
    Ok(out)
}
