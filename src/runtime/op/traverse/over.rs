use crate::batch::Batch;
use crate::error::Result;
use crate::expr::Expr;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};

use super::unnest;

/// Flattens the arrays and sets produced by its expressions. Each input
/// value with at least one element yields exactly one output batch.
pub struct Over {
    parent: BoxPuller,
    exprs: Vec<Expr>,
    batch: Option<Batch>,
    off: usize,
    platoon: Platoon,
}

impl Over {
    pub fn new(parent: BoxPuller, exprs: Vec<Expr>) -> Self {
        Self {
            parent,
            exprs,
            batch: None,
            off: 0,
            platoon: Platoon::new(),
        }
    }

    fn next_from_buffer(&mut self) -> Result<Option<Batch>> {
        let batch = match &self.batch {
            Some(b) => b,
            None => return Ok(None),
        };
        while self.off < batch.len() {
            let v = &batch.values()[self.off];
            self.off += 1;
            let elems = unnest(&self.exprs, v, batch.vars())?;
            if !elems.is_empty() {
                return Ok(Some(batch.wrap(elems, batch.vars().clone())));
            }
        }
        self.batch = None;
        self.off = 0;
        Ok(None)
    }
}

impl Puller for Over {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            self.batch = None;
            self.off = 0;
            expect_done(self.parent.pull(true))?;
            return Ok(None);
        }
        loop {
            match self.next_from_buffer() {
                Ok(Some(out)) => return Ok(Some(out)),
                Ok(None) => {}
                Err(e) => {
                    self.batch = None;
                    self.off = 0;
                    self.platoon.fail();
                    expect_done(self.parent.pull(true))?;
                    return Err(e);
                }
            }
            match self.parent.pull(false) {
                Ok(Some(b)) => {
                    self.batch = Some(b);
                    self.off = 0;
                }
                other => return self.platoon.observe(other),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::path;
    use crate::runtime::testing::{Script, Step};
    use crate::value::{TypeContext, Value};

    #[test]
    fn test_over_one_batch_per_input_value() {
        let zctx = TypeContext::new();
        let rec = |xs: &[i64]| {
            let arr = Value::array(&zctx, xs.iter().map(|x| Value::int64(*x)).collect()).unwrap();
            Value::record(&zctx, vec![("xs", arr)]).unwrap()
        };
        let (script, _) = Script::new(vec![Step::Batch(vec![rec(&[1, 2]), rec(&[]), rec(&[3])])]);
        let mut o = Over::new(Box::new(script), vec![path("xs").unwrap()]);
        let a = o.pull(false).unwrap().unwrap();
        assert_eq!(a.values().iter().map(|v| v.as_int().unwrap()).collect::<Vec<_>>(), vec![1, 2]);
        let b = o.pull(false).unwrap().unwrap();
        assert_eq!(b.len(), 1);
        assert!(o.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_over_concatenates_expressions() {
        let zctx = TypeContext::new();
        let arr = Value::array(&zctx, vec![Value::int64(1)]).unwrap();
        let rec = Value::record(&zctx, vec![("xs", arr), ("y", Value::int64(2))]).unwrap();
        let (script, _) = Script::batches(vec![vec![rec]]);
        let mut o = Over::new(Box::new(script), vec![path("xs").unwrap(), path("y").unwrap()]);
        let out = o.pull(false).unwrap().unwrap();
        assert_eq!(out.values().iter().map(|v| v.as_int().unwrap()).collect::<Vec<_>>(), vec![1, 2]);
    }
}
