//! Pull-based dataflow runtime
//!
//! Every operator implements [`Puller`]. A call with `done == false` asks
//! for the next batch; `Ok(None)` is end-of-stream (EOS) and closes the
//! current platoon. A call with `done == true` tells the operator its
//! consumer wants nothing more from the current platoon: the operator
//! forwards the done upstream (unless the platoon already ended) and
//! returns `Ok(None)`.
//!
//! Protocol rules shared by every operator:
//!
//! * a done pull never yields a batch; observing one panics
//! * after EOS a done is not forwarded upstream
//! * after returning an error the next pull returns `Ok(None)` without
//!   touching the parent, which ends the platoon

pub mod exec;
pub mod op;
pub mod worker;

use crate::batch::Batch;
use crate::config::Config;
use crate::error::Result;
use crate::value::{Comparator, Nulls, SortKey};

/// The operator contract
pub trait Puller: Send {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>>;

    /// Release resources. Called once after the consumer is finished.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type BoxPuller = Box<dyn Puller>;

impl<P: Puller + ?Sized> Puller for Box<P> {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        (**self).pull(done)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Check the result of a done pull.
///
/// # Panics
///
/// Panics if the done pull produced a batch. That is a structural bug in
/// the operator graph, not a runtime condition.
pub fn expect_done(res: Result<Option<Batch>>) -> Result<()> {
    match res {
        Ok(None) => Ok(()),
        Ok(Some(_)) => panic!("non-nil batch returned from a done pull"),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum PlatoonState {
    #[default]
    Open,
    Eos,
    Failed,
}

/// Tracks how the last platoon ended for an operator with a single
/// upstream.
///
/// Call [`Platoon::settled`] first thing in `pull`; when it returns true
/// the call is answered with `Ok(None)` without touching the parent.
#[derive(Debug, Default)]
pub struct Platoon {
    state: PlatoonState,
}

impl Platoon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this pull must be answered with EOS locally: any
    /// pull after an error, or a done right after EOS.
    pub fn settled(&mut self, done: bool) -> bool {
        let state = std::mem::take(&mut self.state);
        match state {
            PlatoonState::Open => false,
            PlatoonState::Failed => true,
            PlatoonState::Eos => done,
        }
    }

    /// Record that EOS was returned
    pub fn eos(&mut self) {
        self.state = PlatoonState::Eos;
    }

    /// Record that an error was returned
    pub fn fail(&mut self) {
        self.state = PlatoonState::Failed;
    }

    pub fn is_open(&self) -> bool {
        self.state == PlatoonState::Open
    }

    /// Helper for the common tail of `pull`: records EOS or failure from
    /// a reply before handing it back.
    pub fn observe(&mut self, reply: Result<Option<Batch>>) -> Result<Option<Batch>> {
        match &reply {
            Ok(None) => self.eos(),
            Err(_) => self.fail(),
            Ok(Some(_)) => {}
        }
        reply
    }
}

/// Runtime settings shared by the operators of one graph
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Maximum values per batch produced by sources
    pub batch_size: usize,
    /// Capacity of the channels between workers and their owners
    pub channel_capacity: usize,
    /// Default live-row limit of `until`
    pub until_limit: usize,
    /// Null placement used by comparators built from this config
    pub nulls: Nulls,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            channel_capacity: 1,
            until_limit: 1_000_000,
            nulls: Nulls::First,
        }
    }
}

impl RuntimeConfig {
    /// Comparator over `keys` placing nulls as configured
    pub fn comparator(&self, keys: Vec<SortKey>) -> Comparator {
        Comparator::new(keys, self.nulls)
    }
}

impl From<&Config> for RuntimeConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            batch_size: cfg.batch_size,
            channel_capacity: cfg.channel_capacity,
            until_limit: cfg.until_limit,
            nulls: cfg.nulls,
        }
    }
}
