//! Order-preserving N-way merge
//!
//! Each parent runs in its own worker; the merge asks every parent that has
//! run dry for its next batch at once and then interleaves buffered values
//! under the comparator. Values are only emitted while every live parent has
//! something buffered, so the merge never pulls further ahead than one
//! batch per parent.

use std::cmp::Ordering;

use crate::batch::Batch;
use crate::context::Context;
use crate::error::Result;
use crate::runtime::worker::Remote;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};
use crate::value::{Comparator, Value};

struct Input {
    remote: Remote,
    batch: Option<Batch>,
    off: usize,
    eos: bool,
}

impl Input {
    fn head(&self) -> Option<&Value> {
        self.batch.as_ref().and_then(|b| b.values().get(self.off))
    }

    fn last(&self) -> Option<&Value> {
        self.batch.as_ref().and_then(|b| b.values().last())
    }

    fn advance(&mut self) {
        self.off += 1;
        if let Some(b) = &self.batch {
            if self.off >= b.len() {
                self.batch = None;
                self.off = 0;
            }
        }
    }
}

pub struct Merge {
    inputs: Vec<Input>,
    cmp: Comparator,
    platoon: Platoon,
}

impl Merge {
    pub fn new(ctx: &Context, parents: Vec<BoxPuller>, cmp: Comparator) -> Result<Self> {
        let inputs = parents
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(Input {
                    remote: Remote::spawn(format!("merge-{}", i), ctx.clone(), p)?,
                    batch: None,
                    off: 0,
                    eos: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            inputs,
            cmp,
            platoon: Platoon::new(),
        })
    }

    /// Request a batch from every live parent with an empty buffer, then
    /// collect the answers.
    fn fill(&mut self) -> Result<()> {
        loop {
            for input in &mut self.inputs {
                if !input.eos && input.batch.is_none() && !input.remote.inflight() {
                    input.remote.send(false)?;
                }
            }
            let mut first_err = None;
            for input in &mut self.inputs {
                if !input.remote.inflight() {
                    continue;
                }
                match input.remote.recv() {
                    Ok(Some(b)) if b.is_empty() => {}
                    Ok(Some(b)) => {
                        input.batch = Some(b);
                        input.off = 0;
                    }
                    Ok(None) => input.eos = true,
                    Err(e) => {
                        input.eos = true;
                        first_err.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
            let starving = self
                .inputs
                .iter()
                .any(|i| !i.eos && i.batch.is_none());
            if !starving {
                return Ok(());
            }
        }
    }

    /// Index of the live input with the smallest head; ties go to the
    /// lowest index.
    fn min_input(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, input) in self.inputs.iter().enumerate() {
            let head = match input.head() {
                Some(h) => h,
                None => continue,
            };
            best = match best {
                None => Some(i),
                Some(b) => {
                    let cur = self.inputs[b].head();
                    match cur.map(|c| self.cmp.compare(head, c)) {
                        Some(Ordering::Less) => Some(i),
                        _ => Some(b),
                    }
                }
            };
        }
        best
    }

    /// True when the whole remaining batch of input `m` sorts strictly
    /// before the head of every other live input
    fn batch_precedes_others(&self, m: usize) -> bool {
        let last = match self.inputs[m].last() {
            Some(v) => v,
            None => return false,
        };
        self.inputs.iter().enumerate().all(|(i, input)| {
            i == m
                || match input.head() {
                    Some(h) => self.cmp.compare(last, h) == Ordering::Less,
                    None => input.eos,
                }
        })
    }

    fn emit(&mut self) -> Option<Batch> {
        let mut out = Vec::new();
        while let Some(m) = self.min_input() {
            if out.is_empty() && self.batch_precedes_others(m) {
                let input = &mut self.inputs[m];
                let batch = input.batch.take()?;
                let off = std::mem::take(&mut input.off);
                if off == 0 {
                    return Some(batch);
                }
                return Some(batch.wrap(batch.values()[off..].to_vec(), batch.vars().clone()));
            }
            let input = &mut self.inputs[m];
            if let Some(v) = input.head() {
                out.push(v.clone());
            }
            input.advance();
            if input.batch.is_none() && !input.eos {
                // Its next batch may hold smaller values than anything
                // still buffered elsewhere.
                break;
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Batch::new(out))
        }
    }

    /// Tell every live parent the platoon is over and reset the buffers
    fn cancel(&mut self) -> Result<()> {
        let mut first_err = None;
        for input in &mut self.inputs {
            if input.remote.inflight() {
                match input.remote.recv() {
                    Ok(None) | Err(_) => input.eos = true,
                    Ok(Some(b)) => b.unref(),
                }
            }
            if !input.eos {
                if let Err(e) = expect_done(input.remote.pull(true)) {
                    first_err.get_or_insert(e);
                }
            }
            input.batch = None;
            input.off = 0;
            input.eos = false;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        for input in &mut self.inputs {
            input.batch = None;
            input.off = 0;
            input.eos = false;
        }
    }
}

impl Puller for Merge {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            self.cancel()?;
            return Ok(None);
        }
        loop {
            if let Err(e) = self.fill() {
                tracing::debug!(error = %e, "merge parent failed; cancelling the others");
                self.platoon.fail();
                // Best effort: the first error is the one reported.
                let _ = self.cancel();
                return Err(e);
            }
            if self.inputs.iter().all(|i| i.eos) {
                self.reset();
                self.platoon.eos();
                return Ok(None);
            }
            if let Some(batch) = self.emit() {
                return Ok(Some(batch));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for input in &mut self.inputs {
            input.batch = None;
            if let Err(e) = input.remote.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{drain_ints, recs, Script, Step};
    use crate::runtime::RuntimeConfig;
    use crate::value::{Nulls, SortKey, TypeContext};

    fn merge_of(scripts: Vec<Script>) -> Merge {
        let parents = scripts
            .into_iter()
            .map(|s| Box::new(s) as BoxPuller)
            .collect();
        Merge::new(
            &Context::background(),
            parents,
            RuntimeConfig::default().comparator(vec![SortKey::asc("v")]),
        )
        .unwrap()
    }

    #[test]
    fn test_merge_interleaves() {
        let zctx = TypeContext::new();
        let (a, _) = Script::batches(vec![recs(&zctx, &[1, 4]), recs(&zctx, &[7])]);
        let (b, _) = Script::batches(vec![recs(&zctx, &[2, 3]), recs(&zctx, &[5, 6, 8])]);
        let mut m = merge_of(vec![a, b]);
        assert_eq!(drain_ints(&mut m), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_merge_stable_by_parent_index() {
        let zctx = TypeContext::new();
        let tagged = |v: i64, src: &str| {
            Value::record(&zctx, vec![("v", Value::int64(v)), ("src", Value::string(src))]).unwrap()
        };
        let (a, _) = Script::batches(vec![vec![tagged(1, "a"), tagged(2, "a")]]);
        let (b, _) = Script::batches(vec![vec![tagged(1, "b"), tagged(2, "b")]]);
        let mut m = merge_of(vec![a, b]);
        let mut srcs = Vec::new();
        while let Some(batch) = m.pull(false).unwrap() {
            for v in batch.values() {
                srcs.push(v.field("src").unwrap().as_str().unwrap().to_string());
            }
        }
        assert_eq!(srcs, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_merge_done_forwards_once_per_live_parent() {
        let zctx = TypeContext::new();
        let (a, ca) = Script::batches(vec![recs(&zctx, &[1, 3])]);
        let (b, cb) = Script::batches(vec![recs(&zctx, &[2, 4])]);
        let mut m = merge_of(vec![a, b]);
        assert!(m.pull(false).unwrap().is_some());
        assert!(m.pull(true).unwrap().is_none());
        assert_eq!(ca.dones(), 1);
        assert_eq!(cb.dones(), 1);
    }

    #[test]
    fn test_merge_error_cancels_others() {
        let zctx = TypeContext::new();
        let (a, _) = Script::new(vec![Step::Fail("disk".into())]);
        let (b, cb) = Script::batches(vec![recs(&zctx, &[1])]);
        let mut m = merge_of(vec![a, b]);
        assert!(m.pull(false).is_err());
        assert_eq!(cb.dones(), 1);
        assert!(m.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_merge_close_closes_every_parent() {
        let zctx = TypeContext::new();
        let (a, ca) = Script::batches(vec![recs(&zctx, &[1])]);
        let (b, cb) = Script::batches(vec![recs(&zctx, &[2])]);
        let mut m = merge_of(vec![a, b]);
        assert_eq!(crate::runtime::exec::collect(&mut m).unwrap().len(), 2);
        assert_eq!(ca.closes(), 1);
        assert_eq!(cb.closes(), 1);
    }

    #[test]
    fn test_merge_places_nulls_as_configured() {
        let zctx = TypeContext::new();
        let null_rec = Value::record(&zctx, vec![("v", Value::null())]).unwrap();
        let (a, _) = Script::batches(vec![vec![null_rec]]);
        let (b, _) = Script::batches(vec![recs(&zctx, &[1, 2])]);
        let rt = RuntimeConfig {
            nulls: Nulls::Last,
            ..RuntimeConfig::default()
        };
        let parents: Vec<BoxPuller> = vec![Box::new(a), Box::new(b)];
        let mut m = Merge::new(&Context::background(), parents, rt.comparator(vec![SortKey::asc("v")])).unwrap();
        let got: Vec<Option<i64>> = crate::runtime::exec::collect(&mut m)
            .unwrap()
            .iter()
            .map(|v| v.field("v").and_then(|f| f.as_int()))
            .collect();
        assert_eq!(got, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn test_merge_empty_parents() {
        let (a, _) = Script::batches(vec![]);
        let (b, _) = Script::batches(vec![]);
        let mut m = merge_of(vec![a, b]);
        assert!(m.pull(false).unwrap().is_none());
    }
}
