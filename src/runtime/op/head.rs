use crate::batch::Batch;
use crate::error::Result;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};

/// Passes the first `limit` values of each platoon.
///
/// When the limit is reached mid-batch the parent is told it is done
/// before the truncated batch is handed out; the following pull is EOS.
pub struct Head {
    parent: BoxPuller,
    limit: usize,
    count: usize,
    platoon: Platoon,
}

impl Head {
    pub fn new(parent: BoxPuller, limit: usize) -> Self {
        Self {
            parent,
            limit,
            count: 0,
            platoon: Platoon::new(),
        }
    }

    fn finish(&mut self) {
        self.count = 0;
        self.platoon.eos();
    }
}

impl Puller for Head {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            self.count = 0;
            return Ok(None);
        }
        if done {
            // Reaching the limit already sent the parent its done.
            let forward = self.count < self.limit || self.limit == 0;
            self.count = 0;
            if forward {
                expect_done(self.parent.pull(true))?;
            }
            return Ok(None);
        }
        if self.count >= self.limit {
            // The limit closed the platoon on the previous pull (or the
            // limit is zero): release the parent and report EOS.
            if self.count == 0 {
                expect_done(self.parent.pull(true))?;
            }
            self.finish();
            return Ok(None);
        }
        let batch = match self.parent.pull(false) {
            Ok(Some(b)) => b,
            other => {
                self.count = 0;
                return self.platoon.observe(other);
            }
        };
        let remaining = self.limit - self.count;
        if batch.len() < remaining {
            self.count += batch.len();
            return Ok(Some(batch));
        }
        self.count = self.limit;
        let out = if batch.len() == remaining {
            batch
        } else {
            let vals = batch.values()[..remaining].to_vec();
            let out = batch.wrap(vals, batch.vars().clone());
            batch.unref();
            out
        };
        if let Err(e) = expect_done(self.parent.pull(true)) {
            self.count = 0;
            self.platoon.fail();
            return Err(e);
        }
        tracing::trace!(limit = self.limit, "head reached limit");
        Ok(Some(out))
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{drain_ints, ints, Script, Step};

    #[test]
    fn test_head_truncates_and_signals_done() {
        let (script, counts) = Script::batches(vec![ints(&[1, 2]), ints(&[3, 4, 5])]);
        let mut h = Head::new(Box::new(script), 3);
        assert_eq!(drain_ints(&mut h), vec![1, 2, 3]);
        assert_eq!(counts.dones(), 1);
        assert_eq!(counts.pulls(), 2);
    }

    #[test]
    fn test_head_short_parent() {
        let (script, counts) = Script::batches(vec![ints(&[1, 2])]);
        let mut h = Head::new(Box::new(script), 5);
        assert_eq!(drain_ints(&mut h), vec![1, 2]);
        assert_eq!(counts.dones(), 0);
        // Done after EOS is not forwarded.
        assert!(h.pull(true).unwrap().is_none());
        assert_eq!(counts.dones(), 0);
    }

    #[test]
    fn test_head_done_after_limit_not_forwarded() {
        let (script, counts) = Script::batches(vec![ints(&[1, 2, 3])]);
        let mut h = Head::new(Box::new(script), 2);
        assert_eq!(h.pull(false).unwrap().unwrap().len(), 2);
        assert!(h.pull(false).unwrap().is_none());
        assert!(h.pull(true).unwrap().is_none());
        assert_eq!(counts.dones(), 1);
    }

    #[test]
    fn test_head_zero() {
        let (script, counts) = Script::batches(vec![ints(&[1])]);
        let mut h = Head::new(Box::new(script), 0);
        assert!(h.pull(false).unwrap().is_none());
        assert_eq!(counts.pulls(), 0);
        assert_eq!(counts.dones(), 1);
    }

    #[test]
    fn test_head_resets_per_platoon() {
        let (script, _) = Script::batches(vec![ints(&[1, 2]), ints(&[3, 4])]);
        let mut h = Head::new(Box::new(script), 1);
        assert_eq!(drain_ints(&mut h), vec![1]);
        // Script drops its remaining steps on done, so the next platoon is empty.
        assert_eq!(drain_ints(&mut h), Vec::<i64>::new());
    }

    #[test]
    fn test_error_then_eos_without_parent() {
        let (script, counts) = Script::new(vec![Step::Fail("boom".into())]);
        let mut h = Head::new(Box::new(script), 3);
        assert!(h.pull(false).is_err());
        assert!(h.pull(false).unwrap().is_none());
        assert_eq!(counts.pulls(), 1);
    }
}
