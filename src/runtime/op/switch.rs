//! Expression switch
//!
//! A router thread owns the parent. Each branch is a [`SwitchBranch`]
//! puller that asks the router for its next batch over a channel. The
//! router evaluates the switch expression on every input value and
//! queues the value for the first case whose key has the same encoded
//! bytes, falling back to the default branch when there is one.
//!
//! A platoon ends once every branch has either seen EOS or sent a done.
//! If that happens before the parent reached EOS, the router sends the
//! parent a done and the next branch pull starts a fresh platoon.
//!
//! The router closes the parent once every branch is closed or dropped;
//! the close of the last branch returns the parent's close result.

use std::collections::VecDeque;
use std::thread;

use bytes::Bytes;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};

use crate::batch::Batch;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};
use crate::value::Value;

type Reply = Result<Option<Batch>>;

enum Request {
    Pull(usize, bool),
    Detach(usize),
    Close(usize, Sender<Result<()>>),
}

struct Route {
    key: Option<Option<Bytes>>,
    reply: Sender<Reply>,
}

/// Builder for a switch; branches are registered before `start`.
pub struct Switch {
    ctx: Context,
    parent: BoxPuller,
    expr: Expr,
    routes: Vec<Route>,
    req_tx: Sender<Request>,
    req_rx: Receiver<Request>,
}

impl Switch {
    pub fn new(ctx: &Context, parent: BoxPuller, expr: Expr) -> Self {
        let (req_tx, req_rx) = unbounded();
        Self {
            ctx: ctx.clone(),
            parent,
            expr,
            routes: Vec::new(),
            req_tx,
            req_rx,
        }
    }

    fn add(&mut self, key: Option<Option<Bytes>>) -> SwitchBranch {
        let (reply_tx, reply_rx) = bounded(1);
        let idx = self.routes.len();
        self.routes.push(Route {
            key,
            reply: reply_tx,
        });
        SwitchBranch {
            idx,
            ctx: self.ctx.clone(),
            req: self.req_tx.clone(),
            reply: reply_rx,
            platoon: Platoon::new(),
            closed: false,
        }
    }

    /// Branch receiving the values whose switch result equals `key`
    pub fn case(&mut self, key: &Value) -> SwitchBranch {
        self.add(Some(key.bytes().cloned()))
    }

    /// Branch receiving the values no case matched
    pub fn default_branch(&mut self) -> SwitchBranch {
        self.add(None)
    }

    /// Spawn the router. Branches block until this is called.
    pub fn start(self) -> Result<()> {
        let Switch {
            ctx,
            parent,
            expr,
            routes,
            req_tx,
            req_rx,
        } = self;
        // Only the branches keep the request channel open.
        drop(req_tx);
        let router = Router {
            ctx,
            parent,
            expr,
            branches: routes
                .into_iter()
                .map(|route| Branch {
                    route,
                    queue: VecDeque::new(),
                    req: None,
                    finished: false,
                    detached: false,
                })
                .collect(),
            eos: false,
        };
        thread::Builder::new()
            .name("logweave-switch".into())
            .spawn(move || router.run(req_rx))?;
        Ok(())
    }
}

struct Branch {
    route: Route,
    queue: VecDeque<Batch>,
    req: Option<bool>,
    finished: bool,
    detached: bool,
}

impl Branch {
    fn idle(&self) -> bool {
        self.finished || self.detached
    }

    fn answer(&mut self, reply: Reply) {
        self.req = None;
        // The branch waits on its reply channel, so this never blocks.
        let _ = self.route.reply.send(reply);
    }
}

struct Router {
    ctx: Context,
    parent: BoxPuller,
    expr: Expr,
    branches: Vec<Branch>,
    // The parent's current platoon has ended
    eos: bool,
}

impl Router {
    fn run(mut self, req_rx: Receiver<Request>) {
        // Close request of the branch whose detach ends the router
        let mut last_close = None;
        loop {
            self.serve();
            if self.branches.iter().all(|b| b.detached) {
                break;
            }
            if self.branches.iter().all(Branch::idle) {
                if let Err(e) = self.end_platoon() {
                    tracing::warn!(error = %e, "switch: done on parent failed");
                }
                continue;
            }
            if self.wants_parent() {
                self.pull_parent();
                continue;
            }
            let done_rx = self.ctx.done().clone();
            select! {
                recv(req_rx) -> msg => match msg {
                    Ok(Request::Pull(idx, done)) => {
                        if let Some(b) = self.branches.get_mut(idx) {
                            b.req = Some(done);
                        }
                    }
                    Ok(Request::Detach(idx)) => self.detach(idx),
                    Ok(Request::Close(idx, ack)) => {
                        self.detach(idx);
                        if self.branches.iter().all(|b| b.detached) {
                            last_close = Some(ack);
                        } else {
                            let _ = ack.send(Ok(()));
                        }
                    }
                    Err(_) => break,
                },
                recv(done_rx) -> _ => break,
            }
        }
        let res = self.parent.close();
        tracing::trace!("switch router exiting");
        match last_close {
            Some(ack) => {
                let _ = ack.send(res);
            }
            None => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "switch: closing parent failed");
                }
            }
        }
    }

    fn detach(&mut self, idx: usize) {
        if let Some(b) = self.branches.get_mut(idx) {
            b.detached = true;
            b.queue.clear();
        }
    }

    /// Answer every outstanding request that can be answered without
    /// pulling the parent
    fn serve(&mut self) {
        let eos = self.eos;
        for b in self.branches.iter_mut().filter(|b| !b.idle()) {
            match b.req {
                Some(true) => {
                    b.queue.clear();
                    b.finished = true;
                    b.answer(Ok(None));
                }
                Some(false) => {
                    if let Some(batch) = b.queue.pop_front() {
                        b.answer(Ok(Some(batch)));
                    } else if eos {
                        b.finished = true;
                        b.answer(Ok(None));
                    }
                }
                None => {}
            }
        }
    }

    fn wants_parent(&self) -> bool {
        !self.eos
            && self
                .branches
                .iter()
                .any(|b| !b.idle() && b.req == Some(false) && b.queue.is_empty())
    }

    fn end_platoon(&mut self) -> Result<()> {
        let res = if self.eos {
            Ok(())
        } else {
            expect_done(self.parent.pull(true))
        };
        self.eos = false;
        for b in &mut self.branches {
            b.finished = false;
            b.queue.clear();
        }
        res
    }

    fn pull_parent(&mut self) {
        let batch = match self.parent.pull(false) {
            Ok(Some(b)) => b,
            Ok(None) => {
                self.eos = true;
                return;
            }
            Err(e) => return self.fail(e),
        };
        if let Err(e) = self.route(&batch) {
            let res = expect_done(self.parent.pull(true));
            self.fail(e);
            if let Err(e) = res {
                tracing::debug!(error = %e, "switch: done after failure");
            }
        }
    }

    fn route(&mut self, batch: &Batch) -> Result<()> {
        let mut outs: Vec<Vec<Value>> = vec![Vec::new(); self.branches.len()];
        for v in batch.values() {
            let key = self.expr.eval(v, batch.vars())?;
            let key = key.body();
            let target = self
                .branches
                .iter()
                .position(|b| matches!(&b.route.key, Some(k) if k.as_deref() == key))
                .or_else(|| self.branches.iter().position(|b| b.route.key.is_none()));
            if let Some(idx) = target {
                outs[idx].push(v.clone());
            }
        }
        for (b, vals) in self.branches.iter_mut().zip(outs) {
            if !vals.is_empty() && !b.idle() {
                b.queue.push_back(batch.wrap(vals, batch.vars().clone()));
            }
        }
        Ok(())
    }

    /// The platoon failed: the error goes to the first branch waiting on
    /// the parent and everyone else sees EOS.
    fn fail(&mut self, err: Error) {
        self.eos = true;
        let mut err = Some(err);
        for b in self.branches.iter_mut().filter(|b| !b.idle()) {
            b.queue.clear();
            if b.req == Some(false) {
                if let Some(e) = err.take() {
                    b.finished = true;
                    b.answer(Err(e));
                }
            }
        }
    }
}

/// One output of a [`Switch`]
pub struct SwitchBranch {
    idx: usize,
    ctx: Context,
    req: Sender<Request>,
    reply: Receiver<Reply>,
    platoon: Platoon,
    closed: bool,
}

impl SwitchBranch {
    fn request(&self, done: bool) -> Reply {
        self.req
            .send(Request::Pull(self.idx, done))
            .map_err(|_| Error::other("switch router exited"))?;
        select! {
            recv(self.reply) -> msg => msg.map_err(|_| Error::other("switch router exited"))?,
            recv(self.ctx.done()) -> _ => Err(self.ctx.cause()),
        }
    }
}

impl Puller for SwitchBranch {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        let reply = self.request(done);
        if done {
            expect_done(reply)?;
            return Ok(None);
        }
        self.platoon.observe(reply)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let (ack_tx, ack_rx) = bounded(1);
        if self.req.send(Request::Close(self.idx, ack_tx)).is_err() {
            return Ok(());
        }
        // A router that exited without answering has already closed the
        // parent.
        ack_rx.recv().unwrap_or(Ok(()))
    }
}

impl Drop for SwitchBranch {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.req.send(Request::Detach(self.idx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{path, this};
    use crate::runtime::testing::{drain_ints, ints, recs, Script, Step};
    use crate::value::TypeContext;

    fn parity(ctx: &Context, parent: Script) -> (SwitchBranch, SwitchBranch) {
        let mut sw = Switch::new(
            ctx,
            Box::new(parent),
            crate::expr::func(|v, _| Ok(Value::int64(v.as_int().unwrap_or(0) % 2))),
        );
        let even = sw.case(&Value::int64(0));
        let odd = sw.case(&Value::int64(1));
        sw.start().unwrap();
        (even, odd)
    }

    #[test]
    fn test_switch_routes_by_key() {
        let ctx = Context::background();
        let (script, _) = Script::batches(vec![ints(&[1, 2, 3]), ints(&[4, 5])]);
        let (mut even, mut odd) = parity(&ctx, script);
        assert_eq!(drain_ints(&mut even), vec![2, 4]);
        assert_eq!(drain_ints(&mut odd), vec![1, 3, 5]);
    }

    #[test]
    fn test_switch_default_branch() {
        let ctx = Context::background();
        let zctx = TypeContext::new();
        let (script, _) = Script::batches(vec![recs(&zctx, &[1, 2, 3])]);
        let mut sw = Switch::new(&ctx, Box::new(script), path("v").unwrap());
        let mut two = sw.case(&Value::int64(2));
        let mut rest = sw.default_branch();
        sw.start().unwrap();
        assert_eq!(drain_ints(&mut two), vec![2]);
        assert_eq!(drain_ints(&mut rest), vec![1, 3]);
    }

    #[test]
    fn test_switch_done_from_all_branches_cancels_parent() {
        let ctx = Context::background();
        let (script, counts) = Script::batches(vec![ints(&[1, 2]), ints(&[3, 4])]);
        let (mut even, mut odd) = parity(&ctx, script);
        assert!(even.pull(false).unwrap().is_some());
        assert!(even.pull(true).unwrap().is_none());
        assert!(odd.pull(true).unwrap().is_none());
        // Once both branches are done the parent sees exactly one done and
        // the next platoon starts empty.
        assert!(odd.pull(false).unwrap().is_none());
        assert_eq!(counts.dones(), 1);
    }

    #[test]
    fn test_last_branch_close_closes_parent() {
        let ctx = Context::background();
        let (script, counts) = Script::batches(vec![ints(&[1, 2, 3])]);
        let (mut even, mut odd) = parity(&ctx, script);
        assert_eq!(drain_ints(&mut even), vec![2]);
        assert_eq!(drain_ints(&mut odd), vec![1, 3]);
        even.close().unwrap();
        assert_eq!(counts.closes(), 0);
        odd.close().unwrap();
        assert_eq!(counts.closes(), 1);
        odd.close().unwrap();
        assert_eq!(counts.closes(), 1);
    }

    #[test]
    fn test_case_keys_match_on_encoded_bytes() {
        let ctx = Context::background();
        let (script, _) = Script::batches(vec![ints(&[-1, 2])]);
        let mut sw = Switch::new(&ctx, Box::new(script), this());
        // int64 -1 and uint64 1 have the same encoded body.
        let mut one = sw.case(&Value::uint64(1));
        let mut rest = sw.default_branch();
        sw.start().unwrap();
        assert_eq!(drain_ints(&mut one), vec![-1]);
        assert_eq!(drain_ints(&mut rest), vec![2]);
    }

    #[test]
    fn test_switch_error_goes_to_waiting_branch() {
        let ctx = Context::background();
        let (script, _) = Script::new(vec![Step::Fail("bad input".into())]);
        let mut sw = Switch::new(&ctx, Box::new(script), this());
        let mut only = sw.case(&Value::int64(1));
        sw.start().unwrap();
        assert!(only.pull(false).is_err());
        assert!(only.pull(false).unwrap().is_none());
    }
}
