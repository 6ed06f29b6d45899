use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::value::{compare_tuples, Nulls, Order, Path, TypeContext, Value};

/// Extracts and orders the key tuple of a record.
///
/// Key paths may be dotted. A key record rebuilds the nested structure of
/// the paths, so the same paths address both base records and the key
/// records stored in index levels.
#[derive(Debug, Clone)]
pub struct Keyer {
    paths: Vec<Path>,
    order: Order,
}

impl Keyer {
    pub fn new(keys: &[String], order: Order) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::invalid("microindex needs at least one key"));
        }
        let paths = keys
            .iter()
            .map(|k| Path::parse(k))
            .collect::<Result<Vec<_>>>()?;
        for (i, p) in paths.iter().enumerate() {
            if p.is_this() {
                return Err(Error::invalid("microindex key must name a field"));
            }
            for q in &paths[..i] {
                if is_prefix(q.segments(), p.segments()) || is_prefix(p.segments(), q.segments()) {
                    return Err(Error::invalid(format!("key paths {} and {} overlap", q, p)));
                }
            }
        }
        Ok(Self { paths, order })
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// The key values of `rec`, in key order; missing fields are null
    pub fn tuple(&self, rec: &Value) -> Vec<Value> {
        self.paths
            .iter()
            .map(|p| p.deref(rec).unwrap_or_else(Value::null))
            .collect()
    }

    /// Order two key tuples under the index order. Only the common prefix
    /// is compared, so a partial tuple matches every key it prefixes.
    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        let n = a.len().min(b.len());
        self.order
            .apply(compare_tuples(&a[..n], &b[..n], Nulls::First))
    }

    /// Build the nested key record holding `tuple`
    pub fn key_record(&self, zctx: &TypeContext, tuple: &[Value]) -> Result<Value> {
        let entries: Vec<(&[String], Value)> = self
            .paths
            .iter()
            .map(|p| p.segments())
            .zip(tuple.iter().cloned())
            .collect();
        build(zctx, &entries)
    }
}

fn is_prefix(a: &[String], b: &[String]) -> bool {
    a.len() <= b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

fn build(zctx: &TypeContext, entries: &[(&[String], Value)]) -> Result<Value> {
    let mut names: Vec<&str> = Vec::new();
    for (segs, _) in entries {
        if let Some(first) = segs.first() {
            if !names.contains(&first.as_str()) {
                names.push(first.as_str());
            }
        }
    }
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let group: Vec<(&[String], Value)> = entries
            .iter()
            .filter(|(segs, _)| segs.first().map(|s| s.as_str()) == Some(name))
            .map(|(segs, v)| (&segs[1..], v.clone()))
            .collect();
        let value = match group.as_slice() {
            [(rest, v)] if rest.is_empty() => v.clone(),
            _ => build(zctx, &group)?,
        };
        fields.push((name.to_string(), value));
    }
    Value::record(zctx, fields)
}
