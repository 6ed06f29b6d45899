//! Expressions evaluated against a value and its variable frame
//!
//! Operators take their static parameters as [`Expr`] handles. There is no
//! parser here: graphs are assembled by the caller from the constructors
//! below.

mod agg;
mod eval;

pub use agg::{Accumulator, Agg, AggKind};
pub use eval::{
    and, cmp, func, literal, not, or, path, record, this, var, CmpOp, Evaluator, Expr,
};
