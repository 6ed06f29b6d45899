//! Labelled fan-in
//!
//! Every parent runs freely in its own worker and pushes batches into one
//! shared channel. Batches come out tagged with the index of the parent
//! that produced them. Per-parent order is preserved; nothing is implied
//! about order across parents.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};

use crate::batch::Batch;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::runtime::worker::join;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller, RuntimeConfig};

enum Ctl {
    Start,
    Done,
    // Done for a platoon that never started
    Abort,
}

enum Msg {
    Batch(Batch),
    Eos,
    Err(Error),
    DoneAck,
}

pub struct Mux {
    ctx: Context,
    ctls: Vec<Sender<Ctl>>,
    results: Receiver<(usize, Msg)>,
    // Each yields its parent's close result
    workers: Vec<JoinHandle<Result<()>>>,
    // Workers that have not yet ended the current platoon
    live: Vec<bool>,
    running: bool,
    platoon: Platoon,
}

impl Mux {
    /// The shared result channel holds up to `rt.channel_capacity`
    /// batches.
    pub fn new(ctx: &Context, parents: Vec<BoxPuller>, rt: &RuntimeConfig) -> Result<Self> {
        let (res_tx, res_rx) = bounded(rt.channel_capacity.max(1));
        let mut ctls = Vec::with_capacity(parents.len());
        let mut workers = Vec::with_capacity(parents.len());
        for (idx, parent) in parents.into_iter().enumerate() {
            let (ctl_tx, ctl_rx) = bounded(1);
            let res_tx = res_tx.clone();
            let ctx = ctx.clone();
            let handle = thread::Builder::new()
                .name(format!("logweave-mux-{}", idx))
                .spawn(move || run_worker(idx, parent, ctx, ctl_rx, res_tx))?;
            ctls.push(ctl_tx);
            workers.push(handle);
        }
        let n = ctls.len();
        Ok(Self {
            ctx: ctx.clone(),
            ctls,
            results: res_rx,
            workers,
            live: vec![false; n],
            running: false,
            platoon: Platoon::new(),
        })
    }

    fn start(&mut self) -> Result<()> {
        for (i, ctl) in self.ctls.iter().enumerate() {
            ctl.send(Ctl::Start)
                .map_err(|_| Error::other(format!("mux worker {} exited", i)))?;
            self.live[i] = true;
        }
        self.running = true;
        Ok(())
    }

    fn recv(&self) -> Result<(usize, Msg)> {
        select! {
            recv(self.results) -> msg => msg.map_err(|_| Error::other("mux workers exited")),
            recv(self.ctx.done()) -> _ => Err(self.ctx.cause()),
        }
    }

    /// Stop every live worker and wait until each has ended its platoon
    fn stop(&mut self) -> Result<()> {
        for (i, ctl) in self.ctls.iter().enumerate() {
            if self.live[i] {
                // A worker that already queued its EOS ignores this.
                let _ = ctl.send(Ctl::Done);
            }
        }
        let mut first_err = None;
        while self.live.iter().any(|l| *l) {
            let (idx, msg) = self.recv()?;
            match msg {
                Msg::Batch(b) => b.unref(),
                Msg::Eos | Msg::DoneAck => self.live[idx] = false,
                Msg::Err(e) => {
                    self.live[idx] = false;
                    first_err.get_or_insert(e);
                }
            }
        }
        self.running = false;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Mux {
    fn abort(&mut self) -> Result<()> {
        for (i, ctl) in self.ctls.iter().enumerate() {
            ctl.send(Ctl::Abort)
                .map_err(|_| Error::other(format!("mux worker {} exited", i)))?;
            self.live[i] = true;
        }
        self.running = true;
        self.stop()
    }
}

impl Puller for Mux {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            if self.running {
                self.stop()?;
            } else {
                self.abort()?;
            }
            return Ok(None);
        }
        if !self.running {
            if self.ctls.is_empty() {
                self.platoon.eos();
                return Ok(None);
            }
            self.start()?;
        }
        loop {
            let (idx, msg) = match self.recv() {
                Ok(m) => m,
                Err(e) => {
                    self.platoon.fail();
                    return Err(e);
                }
            };
            match msg {
                Msg::Batch(b) => return Ok(Some(b.labeled(idx))),
                Msg::Eos | Msg::DoneAck => {
                    self.live[idx] = false;
                    if !self.live.iter().any(|l| *l) {
                        self.running = false;
                        self.platoon.eos();
                        return Ok(None);
                    }
                }
                Msg::Err(e) => {
                    self.live[idx] = false;
                    self.platoon.fail();
                    if let Err(other) = self.stop() {
                        tracing::debug!(error = %other, "mux: second failure while stopping");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Disconnect every worker and wait for each to close its parent
    fn close(&mut self) -> Result<()> {
        self.ctls.clear();
        self.running = false;
        let mut first_err = None;
        for handle in self.workers.drain(..) {
            if let Err(e) = join(handle) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn run_worker(
    idx: usize,
    mut parent: BoxPuller,
    ctx: Context,
    ctl: Receiver<Ctl>,
    out: Sender<(usize, Msg)>,
) -> Result<()> {
    'idle: loop {
        match ctl.recv() {
            Err(_) => break,
            // Late stop for a platoon this worker already finished.
            Ok(Ctl::Done) => continue,
            Ok(Ctl::Abort) => {
                let ack = match expect_done(parent.pull(true)) {
                    Ok(()) => Msg::DoneAck,
                    Err(e) => Msg::Err(e),
                };
                if out.send((idx, ack)).is_err() {
                    break;
                }
                continue;
            }
            Ok(Ctl::Start) => {}
        }
        loop {
            match ctl.try_recv() {
                Ok(Ctl::Done) => {
                    let ack = match expect_done(parent.pull(true)) {
                        Ok(()) => Msg::DoneAck,
                        Err(e) => Msg::Err(e),
                    };
                    if out.send((idx, ack)).is_err() {
                        break 'idle;
                    }
                    continue 'idle;
                }
                Ok(Ctl::Start) | Ok(Ctl::Abort) | Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break 'idle,
            }
            let msg = match parent.pull(false) {
                Ok(Some(b)) => Msg::Batch(b),
                Ok(None) => Msg::Eos,
                Err(e) => Msg::Err(e),
            };
            let last = !matches!(msg, Msg::Batch(_));
            select! {
                send(out, (idx, msg)) -> res => {
                    if res.is_err() {
                        break 'idle;
                    }
                    if last {
                        continue 'idle;
                    }
                }
                recv(ctl) -> cmd => match cmd {
                    Ok(Ctl::Done) => {
                        // The unsent batch is dropped with the platoon.
                        let ack = match expect_done(parent.pull(true)) {
                            Ok(()) => Msg::DoneAck,
                            Err(e) => Msg::Err(e),
                        };
                        if out.send((idx, ack)).is_err() {
                            break 'idle;
                        }
                        continue 'idle;
                    }
                    Ok(Ctl::Start) | Ok(Ctl::Abort) => {}
                    Err(_) => break 'idle,
                },
                recv(ctx.done()) -> _ => break 'idle,
            }
        }
    }
    tracing::trace!(worker = idx, "mux worker exiting");
    parent.close()
}
