//! Worker threads that run a parent puller off the consumer's thread

use std::panic;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use super::{expect_done, BoxPuller};
use crate::batch::Batch;
use crate::context::Context;
use crate::error::{Error, Result};

type Reply = Result<Option<Batch>>;

/// Request/response handle onto a parent running in its own thread.
///
/// `send` forwards one pull to the worker and `recv` waits for its answer,
/// so an owner holding several remotes can have all of them pulling at once.
pub struct Remote {
    name: String,
    ctx: Context,
    req_tx: Option<Sender<bool>>,
    resp_rx: Receiver<Reply>,
    // Yields the parent's close result once the request channel is gone
    handle: Option<JoinHandle<Result<()>>>,
    inflight: bool,
}

impl Remote {
    pub fn spawn(name: impl Into<String>, ctx: Context, parent: BoxPuller) -> Result<Self> {
        let name = name.into();
        let (req_tx, req_rx) = bounded::<bool>(1);
        let (resp_tx, resp_rx) = bounded::<Reply>(1);
        let handle = thread::Builder::new()
            .name(format!("logweave-{}", name))
            .spawn({
                let name = name.clone();
                move || serve(name, parent, req_rx, resp_tx)
            })?;
        Ok(Self {
            name,
            ctx,
            req_tx: Some(req_tx),
            resp_rx,
            handle: Some(handle),
            inflight: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while a request is outstanding
    pub fn inflight(&self) -> bool {
        self.inflight
    }

    /// Forward one pull to the worker without waiting for the answer
    pub fn send(&mut self, done: bool) -> Result<()> {
        debug_assert!(!self.inflight, "remote {} already has a pull in flight", self.name);
        let sent = match &self.req_tx {
            Some(tx) => tx.send(done).is_ok(),
            None => return Err(Error::other(format!("worker {} is shut down", self.name))),
        };
        if !sent {
            return Err(self.exited());
        }
        self.inflight = true;
        Ok(())
    }

    /// Wait for the answer to the outstanding pull
    pub fn recv(&mut self) -> Reply {
        let resp_rx = self.resp_rx.clone();
        let done_rx = self.ctx.done().clone();
        select! {
            recv(resp_rx) -> msg => {
                self.inflight = false;
                match msg {
                    Ok(reply) => reply,
                    Err(_) => Err(self.exited()),
                }
            }
            recv(done_rx) -> _ => Err(self.ctx.cause()),
        }
    }

    pub fn pull(&mut self, done: bool) -> Reply {
        self.send(done)?;
        self.recv()
    }

    /// Stop the worker and close its parent, returning the parent's close
    /// result. Waits for any pull the worker is still running; its answer
    /// is discarded.
    pub fn close(&mut self) -> Result<()> {
        self.req_tx.take();
        self.inflight = false;
        match self.handle.take() {
            Some(handle) => join(handle),
            None => Ok(()),
        }
    }

    // The worker only disconnects early by panicking; re-raise the panic
    // on the owner's thread.
    fn exited(&mut self) -> Error {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = join(handle) {
                tracing::debug!(worker = %self.name, error = %e, "closing parent failed");
            }
        }
        Error::other(format!("worker {} exited", self.name))
    }
}

impl Drop for Remote {
    fn drop(&mut self) {
        // Without a close the worker still shuts down, detached, after any
        // pull it is currently running.
        self.req_tx.take();
    }
}

/// Join a worker thread, re-raising its panic on the caller's thread
pub(crate) fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(res) => res,
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn serve(name: String, mut parent: BoxPuller, req_rx: Receiver<bool>, resp_tx: Sender<Reply>) -> Result<()> {
    for done in req_rx.iter() {
        let reply = parent.pull(done);
        let reply = if done {
            expect_done(reply).map(|_| None)
        } else {
            reply
        };
        if resp_tx.send(reply).is_err() {
            break;
        }
    }
    tracing::trace!(worker = %name, "worker exiting");
    parent.close()
}

/// One-ahead prefetcher over a remote parent.
///
/// After handing out a batch it immediately asks the parent for the next
/// one. A done pull discards any prefetched batch; if the prefetched
/// answer was EOS (or an error) the platoon has already ended and the done
/// is not forwarded.
pub struct Prefetch {
    remote: Remote,
    ended: bool,
}

impl Prefetch {
    pub fn spawn(name: impl Into<String>, ctx: Context, parent: BoxPuller) -> Result<Self> {
        Ok(Self {
            remote: Remote::spawn(name, ctx, parent)?,
            ended: false,
        })
    }

    pub fn pull(&mut self, done: bool) -> Reply {
        if done {
            return self.done();
        }
        if !self.remote.inflight() {
            self.remote.send(false)?;
        }
        self.ended = false;
        let reply = self.remote.recv();
        match &reply {
            Ok(Some(_)) => self.remote.send(false)?,
            Ok(None) | Err(_) => self.ended = true,
        }
        reply
    }

    fn done(&mut self) -> Reply {
        if self.remote.inflight() {
            match self.remote.recv() {
                Ok(Some(batch)) => batch.unref(),
                Ok(None) | Err(_) => {
                    self.ended = false;
                    return Ok(None);
                }
            }
        } else if self.ended {
            self.ended = false;
            return Ok(None);
        }
        expect_done(self.remote.pull(true))?;
        Ok(None)
    }

    /// Stop the worker and close the parent
    pub fn close(&mut self) -> Result<()> {
        self.ended = false;
        self.remote.close()
    }
}
