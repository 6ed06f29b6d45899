use std::cmp::Ordering;

use super::Expr;
use crate::batch::Frame;
use crate::error::{Error, Result};
use crate::value::{compare_values, Nulls, Primitive, Value};

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Count,
    Sum,
    Min,
    Max,
    First,
    Last,
    Avg,
}

impl std::str::FromStr for AggKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "count" => AggKind::Count,
            "sum" => AggKind::Sum,
            "min" => AggKind::Min,
            "max" => AggKind::Max,
            "first" => AggKind::First,
            "last" => AggKind::Last,
            "avg" => AggKind::Avg,
            _ => return Err(Error::invalid(format!("unknown aggregate function \"{}\"", s))),
        })
    }
}

/// An aggregate over an optional operand. `count()` without an operand
/// counts input values; every other function ignores null operands.
#[derive(Clone)]
pub struct Agg {
    kind: AggKind,
    operand: Option<Expr>,
}

impl Agg {
    pub fn new(kind: AggKind, operand: Option<Expr>) -> Self {
        Self { kind, operand }
    }

    pub fn count() -> Self {
        Self::new(AggKind::Count, None)
    }

    pub fn kind(&self) -> AggKind {
        self.kind
    }

    pub fn accumulator(&self) -> Accumulator {
        Accumulator {
            kind: self.kind,
            operand: self.operand.clone(),
            state: State::Empty,
            count: 0,
        }
    }
}

#[derive(Clone)]
enum State {
    Empty,
    Int(i64),
    Float(f64),
    Value(Value),
}

/// Running state of one aggregate
pub struct Accumulator {
    kind: AggKind,
    operand: Option<Expr>,
    state: State,
    count: u64,
}

impl Accumulator {
    pub fn consume(&mut self, this: &Value, vars: &Frame) -> Result<()> {
        let v = match &self.operand {
            Some(e) => e.eval(this, vars)?,
            None => {
                self.count += 1;
                return Ok(());
            }
        };
        if v.is_null() {
            return Ok(());
        }
        self.count += 1;
        match self.kind {
            AggKind::Count => {}
            AggKind::Sum | AggKind::Avg => self.add(&v)?,
            AggKind::Min | AggKind::Max => {
                let want = if self.kind == AggKind::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match &self.state {
                    State::Value(cur) => compare_values(&v, cur, Nulls::Last) == want,
                    _ => true,
                };
                if replace {
                    self.state = State::Value(v);
                }
            }
            AggKind::First => {
                if matches!(self.state, State::Empty) {
                    self.state = State::Value(v);
                }
            }
            AggKind::Last => self.state = State::Value(v),
        }
        Ok(())
    }

    fn add(&mut self, v: &Value) -> Result<()> {
        let prim = v.ty().as_primitive();
        let as_int = match prim {
            Some(Primitive::Int64) => v.as_int(),
            Some(Primitive::Uint64) => v.as_uint().and_then(|u| i64::try_from(u).ok()),
            _ => None,
        };
        let next = match (&self.state, as_int) {
            (State::Empty, Some(i)) => State::Int(i),
            (State::Int(acc), Some(i)) => match acc.checked_add(i) {
                Some(sum) => State::Int(sum),
                None => State::Float(*acc as f64 + i as f64),
            },
            (state, _) => {
                let f = v.as_f64_lossy().ok_or_else(|| {
                    Error::invalid(format!("cannot sum value of type {}", v.ty()))
                })?;
                match state {
                    State::Int(acc) => State::Float(*acc as f64 + f),
                    State::Float(acc) => State::Float(acc + f),
                    _ => State::Float(f),
                }
            }
        };
        self.state = next;
        Ok(())
    }

    pub fn result(&self) -> Value {
        match self.kind {
            AggKind::Count => Value::uint64(self.count),
            AggKind::Avg => {
                if self.count == 0 {
                    return Value::null_of(crate::value::Type::float64());
                }
                let sum = match self.state {
                    State::Int(i) => i as f64,
                    State::Float(f) => f,
                    _ => 0.0,
                };
                Value::float64(sum / self.count as f64)
            }
            _ => match &self.state {
                State::Empty => Value::null(),
                State::Int(i) => Value::int64(*i),
                State::Float(f) => Value::float64(*f),
                State::Value(v) => v.clone(),
            },
        }
    }
}
