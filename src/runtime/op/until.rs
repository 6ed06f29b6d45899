//! Streaming group-by with dynamic emission
//!
//! Each input value updates the aggregation row for its key tuple. When
//! the filter holds for an input value, that value's row is emitted
//! immediately and removed from the table. Rows never flushed by the
//! filter are discarded at EOS.

use std::collections::HashMap;

use crate::batch::Batch;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{Accumulator, Agg, Expr};
use crate::runtime::worker::Prefetch;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller, RuntimeConfig};
use crate::value::{Field, Type, TypeContext, Value};
use crate::zcode;

/// Rows are identified by the encoded key values together with their
/// types, so equal bytes under different key types stay distinct.
type RowKey = (Vec<u8>, Vec<u32>);

struct Row {
    keys: Vec<Value>,
    accs: Vec<Accumulator>,
}

pub struct Until {
    zctx: TypeContext,
    driver: Prefetch,
    keys: Vec<(String, Expr)>,
    aggs: Vec<(String, Agg)>,
    filter: Expr,
    limit: usize,
    table: HashMap<RowKey, Row>,
    out_types: HashMap<Vec<Type>, Type>,
    platoon: Platoon,
}

impl Until {
    /// The table holds at most `rt.until_limit` live rows; a value that
    /// would open one more is an error.
    pub fn new(
        ctx: &Context,
        zctx: &TypeContext,
        parent: BoxPuller,
        keys: Vec<(String, Expr)>,
        aggs: Vec<(String, Agg)>,
        filter: Expr,
        rt: &RuntimeConfig,
    ) -> Result<Self> {
        Ok(Self {
            zctx: zctx.clone(),
            driver: Prefetch::spawn("until", ctx.clone(), parent)?,
            keys,
            aggs,
            filter,
            limit: rt.until_limit.max(1),
            table: HashMap::new(),
            out_types: HashMap::new(),
            platoon: Platoon::new(),
        })
    }

    /// Number of live rows
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    fn consume(&mut self, this: &Value, batch: &Batch) -> Result<Option<Value>> {
        let vars = batch.vars();
        let mut key_vals = Vec::with_capacity(self.keys.len());
        let mut key_bytes = Vec::new();
        let mut key_types = Vec::with_capacity(self.keys.len());
        for (_, e) in &self.keys {
            let v = e.eval(this, vars)?;
            zcode::append_primitive(&mut key_bytes, v.body());
            key_types.push(v.ty().id());
            key_vals.push(v);
        }
        let row_key = (key_bytes, key_types);
        if !self.table.contains_key(&row_key) {
            if self.table.len() >= self.limit {
                return Err(Error::other(format!(
                    "until table exceeded its limit of {} rows",
                    self.limit
                )));
            }
            let row = Row {
                keys: key_vals,
                accs: self.aggs.iter().map(|(_, a)| a.accumulator()).collect(),
            };
            self.table.insert(row_key.clone(), row);
        }
        if let Some(row) = self.table.get_mut(&row_key) {
            for acc in &mut row.accs {
                acc.consume(this, vars)?;
            }
        }
        if !self.filter.eval(this, vars)?.is_true() {
            return Ok(None);
        }
        match self.table.remove(&row_key) {
            Some(row) => self.emit(row).map(Some),
            None => Ok(None),
        }
    }

    fn emit(&mut self, row: Row) -> Result<Value> {
        let mut vals = row.keys;
        vals.extend(row.accs.iter().map(|a| a.result()));
        let types: Vec<Type> = vals.iter().map(|v| v.ty().clone()).collect();
        let ty = match self.out_types.get(&types) {
            Some(t) => t.clone(),
            None => {
                let fields = self
                    .keys
                    .iter()
                    .map(|(n, _)| n)
                    .chain(self.aggs.iter().map(|(n, _)| n))
                    .zip(&types)
                    .map(|(n, t)| Field::new(n.clone(), t.clone()))
                    .collect();
                let t = self.zctx.lookup_record(fields)?;
                self.out_types.insert(types, t.clone());
                t
            }
        };
        Value::record_of(ty, &vals)
    }

    fn reset(&mut self) {
        if !self.table.is_empty() {
            tracing::debug!(rows = self.table.len(), "until: discarding unflushed rows");
            self.table.clear();
        }
    }
}

impl Puller for Until {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            self.reset();
            expect_done(self.driver.pull(true))?;
            return Ok(None);
        }
        loop {
            let batch = match self.driver.pull(false) {
                Ok(Some(b)) => b,
                other => {
                    self.reset();
                    return self.platoon.observe(other);
                }
            };
            let mut out = Vec::new();
            for v in batch.values() {
                match self.consume(v, &batch) {
                    Ok(Some(rec)) => out.push(rec),
                    Ok(None) => {}
                    Err(e) => {
                        self.table.clear();
                        self.platoon.fail();
                        expect_done(self.driver.pull(true))?;
                        return Err(e);
                    }
                }
            }
            if !out.is_empty() {
                return Ok(Some(batch.wrap(out, batch.vars().clone())));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.table.clear();
        self.driver.close()
    }
}
