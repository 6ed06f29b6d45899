//! Cancellation context
//!
//! A `Context` is a clonable cancellation handle shared by every worker of a
//! query graph. Cancellation closes an internal channel, so workers can wait
//! on `ctx.done()` inside a `crossbeam_channel::select!` next to their data
//! channels. Child contexts observe their parent and may carry a deadline.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Error, ErrorKind};

/// Cause recorded when a context is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Canceled {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation handle
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    // Dropping the sender disconnects every clone of `done_rx`.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    cause: Mutex<Option<Canceled>>,
    deadline: Option<Instant>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            done_tx: Mutex::new(Some(tx)),
            done_rx: rx,
            cause: Mutex::new(None),
            deadline,
        }
    }

    fn cancel(&self, cause: Canceled) {
        let mut slot = self.cause.lock();
        if slot.is_none() {
            *slot = Some(cause);
            self.done_tx.lock().take();
        }
    }
}

impl Context {
    /// A root context that is only cancelled explicitly
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// A child context cancelled with this one or by its own `cancel()`
    pub fn with_cancel(&self) -> Self {
        self.child(self.inner.deadline)
    }

    /// A child context that is cancelled after `timeout` elapses
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.child(Some(deadline))
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        let child = Self {
            inner: Arc::new(Inner::new(deadline)),
        };
        let parent = Arc::clone(&self.inner);
        let parent_rx = self.inner.done_rx.clone();
        let child_rx = child.inner.done_rx.clone();
        let weak = Arc::downgrade(&child.inner);
        let timer = match deadline {
            Some(at) => crossbeam_channel::at(at),
            None => never(),
        };
        // The watcher exits once the child is cancelled or dropped.
        thread::spawn(move || {
            select! {
                recv(parent_rx) -> _ => {
                    if let Some(inner) = weak.upgrade() {
                        let cause = (*parent.cause.lock()).unwrap_or(Canceled::Canceled);
                        inner.cancel(cause);
                    }
                }
                recv(child_rx) -> _ => {}
                recv(timer) -> _ => {
                    if let Some(inner) = weak.upgrade() {
                        inner.cancel(Canceled::DeadlineExceeded);
                    }
                }
            }
        });
        child
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.inner.cancel(Canceled::Canceled);
    }

    /// Receiver that becomes ready (disconnected) when the context is done
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Returns whether the context has been cancelled
    pub fn is_done(&self) -> bool {
        self.inner.cause.lock().is_some()
    }

    /// Returns the deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// The cancellation cause as a crate error, or `None` while live
    pub fn err(&self) -> Option<Error> {
        (*self.inner.cause.lock()).map(|cause| Error::from_cause(ErrorKind::Other, cause))
    }

    /// Like `err()` but for call sites that already know the context is done
    pub fn cause(&self) -> Error {
        self.err()
            .unwrap_or_else(|| Error::from_cause(ErrorKind::Other, Canceled::Canceled))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cause", &*self.inner.cause.lock())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
