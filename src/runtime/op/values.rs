use std::collections::VecDeque;

use crate::batch::Batch;
use crate::error::Result;
use crate::runtime::Puller;
use crate::value::Value;

/// In-memory source.
///
/// Emits its values in batches of at most `batch_size`, then EOS. The
/// source is not restartable: once exhausted, or after a done, every
/// further pull is EOS.
pub struct Values {
    pending: VecDeque<Value>,
    batch_size: usize,
}

impl Values {
    pub fn new(values: Vec<Value>, batch_size: usize) -> Self {
        Self {
            pending: values.into(),
            batch_size: batch_size.max(1),
        }
    }
}

impl Puller for Values {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if done {
            self.pending.clear();
            return Ok(None);
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let n = self.batch_size.min(self.pending.len());
        Ok(Some(Batch::new(self.pending.drain(..n).collect())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{drain_ints, ints};

    #[test]
    fn test_batches_then_persistent_eos() {
        let mut v = Values::new(ints(&[1, 2, 3]), 2);
        assert_eq!(v.pull(false).unwrap().unwrap().len(), 2);
        assert_eq!(drain_ints(&mut v), vec![3]);
        assert!(v.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_done_discards() {
        let mut v = Values::new(ints(&[1, 2, 3]), 1);
        assert!(v.pull(false).unwrap().is_some());
        assert!(v.pull(true).unwrap().is_none());
        assert!(v.pull(false).unwrap().is_none());
    }
}
