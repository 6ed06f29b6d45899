//! Lexical sub-graphs for `over ... into (sub)`
//!
//! The scope drives its outer parent through a prefetching worker. For
//! every outer value it loads the traversed elements into a shared slot
//! that the sub-graph reads through its [`ScopeSource`] leaf, one inner
//! platoon per outer value. Batches leaving the sub-graph have the enter
//! variables popped off their frame again.
//!
//! Done travels two ways. A done from the scope's consumer is forwarded
//! into the sub-graph (if an inner platoon is running) and then to the
//! outer parent. A done raised inside the sub-graph reaches only the
//! scope source: it ends the current inner platoon and never propagates
//! outward.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::batch::{Batch, Frame};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::runtime::worker::Prefetch;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};
use crate::value::Value;

use super::unnest;

enum Slot {
    Loaded { elems: VecDeque<Value>, vars: Frame },
    Drained,
    // The sub-graph sent a done for this inner platoon
    Ended,
}

/// Leaf of a scoped sub-graph
pub struct ScopeSource {
    slot: Arc<Mutex<Slot>>,
    batch_size: usize,
}

impl Puller for ScopeSource {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        let mut slot = self.slot.lock();
        if done {
            *slot = Slot::Ended;
            return Ok(None);
        }
        let batch = match &mut *slot {
            Slot::Loaded { elems, vars } if !elems.is_empty() => {
                let n = self.batch_size.min(elems.len());
                let chunk: Vec<Value> = elems.drain(..n).collect();
                Some(Batch::with_vars(chunk, vars.clone()))
            }
            _ => None,
        };
        if batch.is_none() && matches!(*slot, Slot::Loaded { .. }) {
            *slot = Slot::Drained;
        }
        Ok(batch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    DrainingOuter,
    DrainingInner,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Idle => "idle",
            State::Running => "running",
            State::DrainingOuter => "draining-outer",
            State::DrainingInner => "draining-inner",
            State::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Runs a sub-graph once per outer value, over that value's traversed
/// elements.
pub struct Scope {
    name: String,
    driver: Prefetch,
    exprs: Vec<Expr>,
    enter: Vec<(String, Expr)>,
    slot: Arc<Mutex<Slot>>,
    sub: BoxPuller,
    outer: Option<Batch>,
    off: usize,
    state: State,
    platoon: Platoon,
}

impl Scope {
    /// `build` receives the scope source and returns the sub-graph's
    /// output puller. `enter` names the variables pushed for each outer
    /// value; later expressions see the variables pushed before them.
    #[allow(clippy::too_many_arguments)]
    pub fn new<F>(
        ctx: &Context,
        name: impl Into<String>,
        parent: BoxPuller,
        exprs: Vec<Expr>,
        enter: Vec<(String, Expr)>,
        batch_size: usize,
        build: F,
    ) -> Result<Self>
    where
        F: FnOnce(ScopeSource) -> BoxPuller,
    {
        let name = name.into();
        let slot = Arc::new(Mutex::new(Slot::Drained));
        let sub = build(ScopeSource {
            slot: Arc::clone(&slot),
            batch_size: batch_size.max(1),
        });
        Ok(Self {
            driver: Prefetch::spawn(format!("scope-{}", name), ctx.clone(), parent)?,
            name,
            exprs,
            enter,
            slot,
            sub,
            outer: None,
            off: 0,
            state: State::Idle,
            platoon: Platoon::new(),
        })
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            tracing::trace!(scope = %self.name, from = %self.state, to = %next, "scope transition");
            self.state = next;
        }
    }

    fn inner_running(&self) -> bool {
        matches!(self.state, State::Running | State::DrainingInner)
    }

    /// Strip the enter variables off a batch leaving the sub-graph
    fn exit(&self, batch: Batch) -> Batch {
        let vars = batch.vars().pop(self.enter.len());
        Batch::with_vars(batch.into_values(), vars)
    }

    fn enter_vars(&self, this: &Value, outer: &Frame) -> Result<Frame> {
        let mut frame = outer.clone();
        for (name, e) in &self.enter {
            let v = e.eval(this, &frame)?;
            frame = frame.push(name.clone(), v);
        }
        Ok(frame)
    }

    /// Traverse the next outer value that has elements. `Ok(None)` is the
    /// end of the outer platoon.
    fn next_outer(&mut self) -> Result<Option<(VecDeque<Value>, Frame)>> {
        loop {
            if let Some(batch) = self.outer.clone() {
                while self.off < batch.len() {
                    let v = &batch.values()[self.off];
                    self.off += 1;
                    let elems = unnest(&self.exprs, v, batch.vars())?;
                    if elems.is_empty() {
                        continue;
                    }
                    let vars = self.enter_vars(v, batch.vars())?;
                    return Ok(Some((elems.into(), vars)));
                }
                self.outer = None;
                self.off = 0;
            }
            match self.driver.pull(false)? {
                Some(b) => {
                    self.outer = Some(b);
                    self.off = 0;
                }
                None => return Ok(None),
            }
        }
    }

    fn fail(&mut self, err: Error, abandon_outer: bool) -> Result<Option<Batch>> {
        self.platoon.fail();
        self.outer = None;
        self.off = 0;
        *self.slot.lock() = Slot::Drained;
        self.set_state(State::Idle);
        if abandon_outer {
            if let Err(e) = expect_done(self.driver.pull(true)) {
                tracing::debug!(scope = %self.name, error = %e, "scope: done to parent failed");
            }
        }
        Err(Error::wrap(self.name.clone(), err))
    }

    fn outer_done(&mut self) -> Result<Option<Batch>> {
        let mid_platoon = self.inner_running();
        self.set_state(State::DrainingOuter);
        let inner = if mid_platoon {
            expect_done(self.sub.pull(true))
        } else {
            Ok(())
        };
        *self.slot.lock() = Slot::Drained;
        self.outer = None;
        self.off = 0;
        let outer = expect_done(self.driver.pull(true));
        self.set_state(State::Idle);
        inner.and(outer).map_err(|e| Error::wrap(self.name.clone(), e))?;
        Ok(None)
    }
}

impl Puller for Scope {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.state == State::Closed {
            return Ok(None);
        }
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            return self.outer_done();
        }
        loop {
            if self.inner_running() {
                match self.sub.pull(false) {
                    Ok(Some(b)) => {
                        if matches!(*self.slot.lock(), Slot::Ended) {
                            self.set_state(State::DrainingInner);
                        }
                        return Ok(Some(self.exit(b)));
                    }
                    Ok(None) => {
                        *self.slot.lock() = Slot::Drained;
                        self.set_state(State::Idle);
                    }
                    Err(e) => return self.fail(e, true),
                }
                continue;
            }
            let outer_eval = match self.next_outer() {
                Ok(Some((elems, vars))) => {
                    *self.slot.lock() = Slot::Loaded { elems, vars };
                    self.set_state(State::Running);
                    continue;
                }
                Ok(None) => {
                    self.platoon.eos();
                    return Ok(None);
                }
                Err(e) => e,
            };
            // An error with an outer batch still buffered came from
            // evaluation, not from the parent.
            let abandon = self.outer.is_some();
            return self.fail(outer_eval, abandon);
        }
    }

    fn close(&mut self) -> Result<()> {
        self.set_state(State::Closed);
        self.outer = None;
        let sub = self.sub.close();
        let outer = self.driver.close();
        sub.and(outer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::expr::{cmp, path, this, var, CmpOp};
    use crate::runtime::op::{Filter, Head};
    use crate::runtime::testing::{drain_ints, Counts, Script, Step};
    use crate::value::TypeContext;

    struct Counting(ScopeSource, Arc<Counts>);

    impl Puller for Counting {
        fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
            let counter = if done { &self.1.dones } else { &self.1.pulls };
            counter.fetch_add(1, Ordering::SeqCst);
            self.0.pull(done)
        }
    }

    fn xs(zctx: &TypeContext, vals: &[i64], extra: Option<(&str, i64)>) -> Value {
        let arr = Value::array(zctx, vals.iter().map(|v| Value::int64(*v)).collect()).unwrap();
        let mut fields = vec![("xs".to_string(), arr)];
        if let Some((name, v)) = extra {
            fields.push((name.to_string(), Value::int64(v)));
        }
        Value::record(zctx, fields).unwrap()
    }

    #[test]
    fn test_over_into_head_ends_inner_platoon_only() {
        let zctx = TypeContext::new();
        let (outer, outer_counts) = Script::batches(vec![vec![xs(&zctx, &[1, 2, 3], None)]]);
        let inner = Arc::new(Counts::default());
        let inner_for_build = Arc::clone(&inner);
        let mut scope = Scope::new(
            &Context::background(),
            "over",
            Box::new(outer),
            vec![path("xs").unwrap()],
            vec![],
            1,
            move |src| Box::new(Head::new(Box::new(Counting(src, inner_for_build)), 2)),
        )
        .unwrap();
        assert_eq!(drain_ints(&mut scope), vec![1, 2]);
        assert_eq!(inner.pulls(), 2);
        assert_eq!(inner.dones(), 1);
        assert_eq!(outer_counts.dones(), 0);
    }

    #[test]
    fn test_enter_vars_visible_inside_and_popped_outside() {
        let zctx = TypeContext::new();
        let (outer, _) = Script::batches(vec![vec![
            xs(&zctx, &[1, 2, 3], Some(("min", 1))),
            xs(&zctx, &[5, 0], Some(("min", 4))),
        ]]);
        let mut scope = Scope::new(
            &Context::background(),
            "over",
            Box::new(outer),
            vec![path("xs").unwrap()],
            vec![("min".to_string(), path("min").unwrap())],
            10,
            |src| Box::new(Filter::new(Box::new(src), cmp(CmpOp::Gt, this(), var("min")))),
        )
        .unwrap();
        let mut got = Vec::new();
        while let Some(b) = scope.pull(false).unwrap() {
            assert!(b.vars().is_empty());
            got.extend(b.values().iter().map(|v| v.as_int().unwrap()));
        }
        assert_eq!(got, vec![2, 3, 5]);
    }

    #[test]
    fn test_outer_done_reaches_sub_and_parent() {
        let zctx = TypeContext::new();
        let (outer, outer_counts) = Script::batches(vec![
            vec![xs(&zctx, &[1, 2, 3], None)],
            vec![xs(&zctx, &[4], None)],
        ]);
        let inner = Arc::new(Counts::default());
        let inner_for_build = Arc::clone(&inner);
        let mut scope = Scope::new(
            &Context::background(),
            "over",
            Box::new(outer),
            vec![path("xs").unwrap()],
            vec![],
            1,
            move |src| Box::new(Counting(src, inner_for_build)),
        )
        .unwrap();
        assert!(scope.pull(false).unwrap().is_some());
        assert!(scope.pull(true).unwrap().is_none());
        assert_eq!(inner.dones(), 1);
        assert_eq!(outer_counts.dones(), 1);
    }

    #[test]
    fn test_close_reaches_sub_and_outer_parent() {
        struct Closing(ScopeSource, Arc<Counts>);
        impl Puller for Closing {
            fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
                self.0.pull(done)
            }
            fn close(&mut self) -> Result<()> {
                self.1.closes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let zctx = TypeContext::new();
        let (outer, outer_counts) = Script::batches(vec![vec![xs(&zctx, &[1, 2], None)]]);
        let inner = Arc::new(Counts::default());
        let inner_for_build = Arc::clone(&inner);
        let mut scope = Scope::new(
            &Context::background(),
            "over",
            Box::new(outer),
            vec![path("xs").unwrap()],
            vec![],
            10,
            move |src| Box::new(Closing(src, inner_for_build)),
        )
        .unwrap();
        assert_eq!(crate::runtime::exec::collect(&mut scope).unwrap().len(), 2);
        assert_eq!(inner.closes(), 1);
        assert_eq!(outer_counts.closes(), 1);
        assert!(scope.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_sub_error_is_wrapped_with_scope_name() {
        let zctx = TypeContext::new();
        let (outer, _) = Script::new(vec![Step::Batch(vec![xs(&zctx, &[1], None)])]);
        let mut scope = Scope::new(
            &Context::background(),
            "inner-scope",
            Box::new(outer),
            vec![path("xs").unwrap()],
            vec![],
            1,
            |src| Box::new(Filter::new(Box::new(src), var("missing"))),
        )
        .unwrap();
        let err = scope.pull(false).unwrap_err();
        assert_eq!(err.op(), Some("inner-scope"));
        assert!(err.is(crate::error::ErrorKind::Invalid));
        assert!(scope.pull(false).unwrap().is_none());
    }
}
