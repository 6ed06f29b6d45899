//! Total ordering over values
//!
//! Numbers compare across int64, uint64 and float64. Nulls sit at one end
//! of the order (chosen by `Nulls`), and NaNs are grouped next to them.
//! Values of unrelated types order by type id.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::types::{Primitive, TypeDesc};
use super::{Path, Value};

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }

    pub fn is_desc(&self) -> bool {
        matches!(self, Order::Desc)
    }
}

impl std::str::FromStr for Order {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(crate::error::Error::invalid(format!(
                "unknown sort order \"{}\" (want asc or desc)",
                s
            ))),
        }
    }
}

/// Placement of nulls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nulls {
    #[default]
    First,
    Last,
}

fn is_nan(v: &Value) -> bool {
    v.as_float().map(|f| f.is_nan()).unwrap_or(false)
}

/// Compare two values in ascending order with nulls placed per `nulls`
pub fn compare_values(a: &Value, b: &Value, nulls: Nulls) -> Ordering {
    let (an, bn) = (a.is_null(), b.is_null());
    let (anan, bnan) = (is_nan(a), is_nan(b));
    if an || bn || anan || bnan {
        if an && bn || anan && bnan {
            return Ordering::Equal;
        }
        // A NaN sits between the null end and the ordinary values.
        let rank = |null: bool, nan: bool| match (null, nan, nulls) {
            (true, _, Nulls::First) => 0,
            (_, true, Nulls::First) => 1,
            (false, false, Nulls::First) => 2,
            (false, false, Nulls::Last) => 0,
            (_, true, Nulls::Last) => 1,
            (true, _, Nulls::Last) => 2,
        };
        return rank(an, anan).cmp(&rank(bn, bnan));
    }
    compare_non_null(a, b, nulls)
}

fn compare_non_null(a: &Value, b: &Value, nulls: Nulls) -> Ordering {
    let (ap, bp) = (a.ty().as_primitive(), b.ty().as_primitive());
    if let (Some(ap), Some(bp)) = (ap, bp) {
        if ap.is_numeric() && bp.is_numeric() {
            return compare_numbers(a, b);
        }
        if ap == bp {
            return match ap {
                Primitive::Bool => a.as_bool().cmp(&b.as_bool()),
                Primitive::Int64 | Primitive::Time | Primitive::Duration => {
                    a.as_int().cmp(&b.as_int())
                }
                _ => a.body().cmp(&b.body()),
            };
        }
    }
    if a.ty().under() != b.ty().under() {
        return a.ty().under().id().cmp(&b.ty().under().id());
    }
    match a.ty().under().desc() {
        TypeDesc::Record(_) => match (a.fields(), b.fields()) {
            (Ok(af), Ok(bf)) => {
                for ((_, x), (_, y)) in af.iter().zip(bf.iter()) {
                    let ord = compare_values(x, y, nulls);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
            _ => a.body().cmp(&b.body()),
        },
        TypeDesc::Array(_) | TypeDesc::Set(_) => match (a.elements(), b.elements()) {
            (Ok(ae), Ok(be)) => {
                for (x, y) in ae.iter().zip(be.iter()) {
                    let ord = compare_values(x, y, nulls);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                ae.len().cmp(&be.len())
            }
            _ => a.body().cmp(&b.body()),
        },
        TypeDesc::Union(_) => match (a.clone().unwrap_union(), b.clone().unwrap_union()) {
            (Ok(x), Ok(y)) => compare_values(&x, &y, nulls),
            _ => a.body().cmp(&b.body()),
        },
        _ => a.body().cmp(&b.body()),
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a.as_int(), a.as_uint(), b.as_int(), b.as_uint()) {
        (Some(x), _, Some(y), _) => x.cmp(&y),
        (_, Some(x), _, Some(y)) => x.cmp(&y),
        (Some(x), _, _, Some(y)) => {
            if x < 0 {
                Ordering::Less
            } else {
                (x as u64).cmp(&y)
            }
        }
        (_, Some(x), Some(y), _) => {
            if y < 0 {
                Ordering::Greater
            } else {
                x.cmp(&(y as u64))
            }
        }
        _ => {
            let x = a.as_f64_lossy().unwrap_or(f64::NAN);
            let y = b.as_f64_lossy().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
    }
}

/// Lexicographic comparison of key tuples
pub fn compare_tuples(a: &[Value], b: &[Value], nulls: Nulls) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_values(x, y, nulls);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// One sort key: a field path and a direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: Path,
    pub order: Order,
}

impl SortKey {
    pub fn new(path: Path, order: Order) -> Self {
        Self { path, order }
    }

    pub fn asc(path: &str) -> Self {
        Self::new(Path::parse(path).unwrap_or_default(), Order::Asc)
    }

    pub fn desc(path: &str) -> Self {
        Self::new(Path::parse(path).unwrap_or_default(), Order::Desc)
    }
}

/// Record comparator built from sort keys. Missing key fields compare as
/// null. Direction applies to ordinary values only; nulls stay at the end
/// selected by `nulls` whichever way the key runs.
#[derive(Debug, Clone)]
pub struct Comparator {
    keys: Vec<SortKey>,
    nulls: Nulls,
}

impl Comparator {
    pub fn new(keys: Vec<SortKey>, nulls: Nulls) -> Self {
        Self { keys, nulls }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.keys {
            let x = key.path.deref(a).unwrap_or_else(Value::null);
            let y = key.path.deref(b).unwrap_or_else(Value::null);
            let special = x.is_null() || y.is_null() || is_nan(&x) || is_nan(&y);
            let ord = compare_values(&x, &y, self.nulls);
            let ord = if special { ord } else { key.order.apply(ord) };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
