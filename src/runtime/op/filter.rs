use crate::batch::Batch;
use crate::error::Result;
use crate::expr::Expr;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};

/// Keeps the values for which the predicate is true. Batches left empty
/// by the predicate are not emitted.
pub struct Filter {
    parent: BoxPuller,
    predicate: Expr,
    platoon: Platoon,
}

impl Filter {
    pub fn new(parent: BoxPuller, predicate: Expr) -> Self {
        Self {
            parent,
            predicate,
            platoon: Platoon::new(),
        }
    }
}

impl Puller for Filter {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            expect_done(self.parent.pull(true))?;
            return Ok(None);
        }
        loop {
            let batch = match self.parent.pull(false) {
                Ok(Some(b)) => b,
                other => return self.platoon.observe(other),
            };
            let mut out = Vec::new();
            for v in batch.values() {
                match self.predicate.eval(v, batch.vars()) {
                    Ok(r) if r.is_true() => out.push(v.clone()),
                    Ok(_) => {}
                    Err(e) => {
                        // Abandon the rest of this platoon upstream.
                        self.platoon.fail();
                        expect_done(self.parent.pull(true))?;
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
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{cmp, literal, this, CmpOp};
    use crate::runtime::op::Values;
    use crate::runtime::testing::{drain_ints, ints, Script, Step};
    use crate::value::Value;

    #[test]
    fn test_filter_drops_empty_batches() {
        let src = Values::new(ints(&[1, 2, 3, 4, 5, 6]), 2);
        let mut f = Filter::new(
            Box::new(src),
            cmp(CmpOp::Ge, this(), literal(Value::int64(5))),
        );
        let b = f.pull(false).unwrap().unwrap();
        assert_eq!(b.len(), 2);
        assert!(f.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_filter_error_then_eos() {
        let (script, counts) =
            Script::new(vec![Step::Fail("bad".into()), Step::Batch(ints(&[1]))]);
        let mut f = Filter::new(Box::new(script), this());
        assert!(f.pull(false).is_err());
        assert!(f.pull(false).unwrap().is_none());
        assert_eq!(counts.pulls(), 1);
        // The next platoon reaches the parent again.
        assert_eq!(drain_ints(&mut f), Vec::<i64>::new());
        assert_eq!(counts.pulls(), 3);
    }

    #[test]
    fn test_done_after_eos_not_forwarded() {
        let (script, counts) = Script::batches(vec![]);
        let mut f = Filter::new(Box::new(script), this());
        assert!(f.pull(false).unwrap().is_none());
        assert!(f.pull(true).unwrap().is_none());
        assert_eq!(counts.dones(), 0);
    }
}
