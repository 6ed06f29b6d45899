use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::from::Scheduler;
use crate::batch::Batch;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::microindex::{Finder, Range};
use crate::runtime::{BoxPuller, Puller};
use crate::value::{TypeContext, Value};

/// Source streaming the base records of one microindex key range.
///
/// Not restartable: after EOS, an error or a done, every pull is EOS.
pub struct IndexScan {
    range: Option<Range>,
    batch_size: usize,
}

impl IndexScan {
    pub fn new(range: Range, batch_size: usize) -> Self {
        Self {
            range: Some(range),
            batch_size: batch_size.max(1),
        }
    }

    /// Scan the records of the index at `path` with keys in `[lo, hi)`
    pub fn open(
        ctx: &Context,
        zctx: &TypeContext,
        path: impl AsRef<Path>,
        lo: Option<Vec<Value>>,
        hi: Option<Vec<Value>>,
        batch_size: usize,
    ) -> Result<Self> {
        let finder = Finder::open(path, zctx)?;
        Ok(Self::new(finder.range(lo, hi, ctx)?, batch_size))
    }
}

impl Puller for IndexScan {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if done {
            self.range = None;
            return Ok(None);
        }
        let range = match self.range.as_mut() {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut vals = Vec::with_capacity(self.batch_size);
        while vals.len() < self.batch_size {
            match range.next() {
                Some(Ok(v)) => vals.push(v),
                Some(Err(e)) => {
                    self.range = None;
                    return Err(e);
                }
                None => break,
            }
        }
        if vals.is_empty() {
            self.range = None;
            return Ok(None);
        }
        Ok(Some(Batch::new(vals)))
    }

    fn close(&mut self) -> Result<()> {
        self.range = None;
        Ok(())
    }
}

/// Schedules one [`IndexScan`] per index file, in the order given
pub struct IndexScheduler {
    ctx: Context,
    zctx: TypeContext,
    paths: VecDeque<PathBuf>,
    lo: Option<Vec<Value>>,
    hi: Option<Vec<Value>>,
    batch_size: usize,
}

impl IndexScheduler {
    pub fn new(ctx: &Context, zctx: &TypeContext, paths: Vec<PathBuf>, batch_size: usize) -> Self {
        Self {
            ctx: ctx.clone(),
            zctx: zctx.clone(),
            paths: paths.into(),
            lo: None,
            hi: None,
            batch_size,
        }
    }

    /// Restrict every scan to keys in `[lo, hi)`
    pub fn with_range(mut self, lo: Option<Vec<Value>>, hi: Option<Vec<Value>>) -> Self {
        self.lo = lo;
        self.hi = hi;
        self
    }
}

impl Scheduler for IndexScheduler {
    fn next_task(&mut self) -> Result<Option<BoxPuller>> {
        let path = match self.paths.pop_front() {
            Some(p) => p,
            None => return Ok(None),
        };
        tracing::debug!(path = %path.display(), "scheduling index scan");
        let scan = IndexScan::open(
            &self.ctx,
            &self.zctx,
            &path,
            self.lo.clone(),
            self.hi.clone(),
            self.batch_size,
        )
        .map_err(|e| Error::wrap(format!("scan {}", path.display()), e))?;
        Ok(Some(Box::new(scan)))
    }
}
