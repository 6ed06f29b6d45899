use std::cmp::Ordering;
use std::sync::Arc;

use crate::batch::Frame;
use crate::error::{Error, Result};
use crate::value::{compare_values, Nulls, Path, TypeContext, Value};

/// Something that computes a value from an input value and the variables
/// in scope
pub trait Evaluator: Send + Sync {
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value>;
}

/// Shared expression handle
pub type Expr = Arc<dyn Evaluator>;

struct This;

impl Evaluator for This {
    fn eval(&self, this: &Value, _vars: &Frame) -> Result<Value> {
        Ok(this.clone())
    }
}

/// The input value itself
pub fn this() -> Expr {
    Arc::new(This)
}

struct DotPath(Path);

impl Evaluator for DotPath {
    fn eval(&self, this: &Value, _vars: &Frame) -> Result<Value> {
        Ok(self.0.deref(this).unwrap_or_else(Value::null))
    }
}

/// Field of the input at a dotted path; missing fields evaluate to null
pub fn path(p: &str) -> Result<Expr> {
    Ok(Arc::new(DotPath(Path::parse(p)?)))
}

struct Var(String);

impl Evaluator for Var {
    fn eval(&self, _this: &Value, vars: &Frame) -> Result<Value> {
        vars.lookup(&self.0)
            .cloned()
            .ok_or_else(|| Error::invalid(format!("variable \"{}\" is not in scope", self.0)))
    }
}

/// Innermost variable with the given name
pub fn var(name: &str) -> Expr {
    Arc::new(Var(name.to_string()))
}

struct Literal(Value);

impl Evaluator for Literal {
    fn eval(&self, _this: &Value, _vars: &Frame) -> Result<Value> {
        Ok(self.0.clone())
    }
}

pub fn literal(v: Value) -> Expr {
    Arc::new(Literal(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Compare {
    op: CmpOp,
    lhs: Expr,
    rhs: Expr,
}

impl Evaluator for Compare {
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value> {
        let a = self.lhs.eval(this, vars)?;
        let b = self.rhs.eval(this, vars)?;
        // Ordering tests against null are false; equality treats two
        // nulls as equal.
        if (a.is_null() || b.is_null()) && !matches!(self.op, CmpOp::Eq | CmpOp::Ne) {
            return Ok(Value::bool(false));
        }
        let ord = compare_values(&a, &b, Nulls::First);
        let result = match self.op {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        };
        Ok(Value::bool(result))
    }
}

pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
    Arc::new(Compare { op, lhs, rhs })
}

struct Logic {
    and: bool,
    lhs: Expr,
    rhs: Expr,
}

impl Evaluator for Logic {
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value> {
        let lhs = self.lhs.eval(this, vars)?.is_true();
        if lhs != self.and {
            return Ok(Value::bool(lhs));
        }
        Ok(Value::bool(self.rhs.eval(this, vars)?.is_true()))
    }
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    Arc::new(Logic { and: true, lhs, rhs })
}

pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    Arc::new(Logic {
        and: false,
        lhs,
        rhs,
    })
}

struct Not(Expr);

impl Evaluator for Not {
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value> {
        Ok(Value::bool(!self.0.eval(this, vars)?.is_true()))
    }
}

pub fn not(e: Expr) -> Expr {
    Arc::new(Not(e))
}

struct Record {
    zctx: TypeContext,
    fields: Vec<(String, Expr)>,
}

impl Evaluator for Record {
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value> {
        let fields = self
            .fields
            .iter()
            .map(|(name, e)| Ok((name.clone(), e.eval(this, vars)?)))
            .collect::<Result<Vec<_>>>()?;
        Value::record(&self.zctx, fields)
    }
}

/// Record literal whose fields are expressions
pub fn record(zctx: &TypeContext, fields: Vec<(String, Expr)>) -> Expr {
    Arc::new(Record {
        zctx: zctx.clone(),
        fields,
    })
}

struct Func<F>(F);

impl<F> Evaluator for Func<F>
where
    F: Fn(&Value, &Frame) -> Result<Value> + Send + Sync,
{
    fn eval(&self, this: &Value, vars: &Frame) -> Result<Value> {
        (self.0)(this, vars)
    }
}

/// Expression backed by a closure
pub fn func<F>(f: F) -> Expr
where
    F: Fn(&Value, &Frame) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(Func(f))
}
