use std::collections::VecDeque;

use crate::batch::{Batch, Frame};
use crate::error::Result;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};

/// Emits the last `limit` values of each platoon as one batch.
pub struct Tail {
    parent: BoxPuller,
    limit: usize,
    emitted: bool,
    platoon: Platoon,
}

impl Tail {
    pub fn new(parent: BoxPuller, limit: usize) -> Self {
        Self {
            parent,
            limit,
            emitted: false,
            platoon: Platoon::new(),
        }
    }
}

impl Puller for Tail {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.emitted {
            // The parent reached EOS before the tail batch went out.
            self.emitted = false;
            if !done {
                self.platoon.eos();
            }
            return Ok(None);
        }
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            expect_done(self.parent.pull(true))?;
            return Ok(None);
        }
        let mut held: VecDeque<Batch> = VecDeque::new();
        let mut count = 0usize;
        loop {
            let batch = match self.parent.pull(false) {
                Ok(Some(b)) => b,
                Ok(None) => break,
                Err(e) => {
                    self.platoon.fail();
                    return Err(e);
                }
            };
            count += batch.len();
            held.push_back(batch);
            // Drop whole batches from the front while the rest still
            // covers the limit.
            while let Some(front) = held.front() {
                if count - front.len() < self.limit {
                    break;
                }
                count -= front.len();
                if let Some(b) = held.pop_front() {
                    b.unref();
                }
            }
        }
        if count == 0 {
            self.platoon.eos();
            return Ok(None);
        }
        let skip = count.saturating_sub(self.limit);
        let vars = held.back().map(|b| b.vars().clone()).unwrap_or_else(Frame::new);
        let mut out = Vec::with_capacity(count - skip);
        let mut skipped = 0;
        for b in held {
            for v in b.values() {
                if skipped < skip {
                    skipped += 1;
                    continue;
                }
                out.push(v.clone());
            }
        }
        self.emitted = true;
        Ok(Some(Batch::with_vars(out, vars)))
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{drain_ints, ints, Script};

    #[test]
    fn test_tail_with_batch_split() {
        let (script, _) = Script::batches(vec![ints(&[1, 2, 3]), ints(&[4, 5]), ints(&[6, 7, 8, 9])]);
        let mut t = Tail::new(Box::new(script), 3);
        assert_eq!(drain_ints(&mut t), vec![7, 8, 9]);
    }

    #[test]
    fn test_tail_short_parent() {
        let (script, _) = Script::batches(vec![ints(&[1]), ints(&[2])]);
        let mut t = Tail::new(Box::new(script), 5);
        assert_eq!(drain_ints(&mut t), vec![1, 2]);
    }

    #[test]
    fn test_tail_empty_parent() {
        let (script, counts) = Script::batches(vec![]);
        let mut t = Tail::new(Box::new(script), 2);
        assert!(t.pull(false).unwrap().is_none());
        assert!(t.pull(true).unwrap().is_none());
        assert_eq!(counts.dones(), 0);
    }

    #[test]
    fn test_done_after_tail_batch_not_forwarded() {
        let (script, counts) = Script::batches(vec![ints(&[1, 2])]);
        let mut t = Tail::new(Box::new(script), 1);
        assert_eq!(t.pull(false).unwrap().unwrap().len(), 1);
        assert!(t.pull(true).unwrap().is_none());
        assert_eq!(counts.dones(), 0);
    }
}
