use std::path::{Path, PathBuf};

use crate::batch::Batch;
use crate::error::Result;
use crate::microindex::{Writer, WriterOptions};
use crate::runtime::{expect_done, BoxPuller, Puller};
use crate::value::{TypeContext, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Emitted,
    Finished,
}

/// Sink that drains its parent into a microindex file.
///
/// The first pull consumes the whole parent stream, closes the index and
/// returns one summary record `{path, records}`; the pull after that is
/// EOS. Any failure removes the partial file; a done before the first
/// pull creates no file at all.
pub struct Load {
    zctx: TypeContext,
    parent: BoxPuller,
    path: PathBuf,
    opts: WriterOptions,
    state: State,
}

impl Load {
    pub fn new(zctx: &TypeContext, parent: BoxPuller, path: impl AsRef<Path>, opts: WriterOptions) -> Self {
        Self {
            zctx: zctx.clone(),
            parent,
            path: path.as_ref().to_path_buf(),
            opts,
            state: State::Ready,
        }
    }

    fn abort(&mut self, w: Writer) {
        if let Err(e) = w.abort() {
            tracing::warn!(path = %self.path.display(), error = %e, "load: removing partial index failed");
        }
    }

    fn load(&mut self) -> Result<Value> {
        let mut w = match Writer::new(&self.zctx, &self.path, self.opts.clone()) {
            Ok(w) => w,
            Err(e) => {
                expect_done(self.parent.pull(true))?;
                return Err(e);
            }
        };
        loop {
            let batch = match self.parent.pull(false) {
                Ok(Some(b)) => b,
                Ok(None) => break,
                Err(e) => {
                    self.abort(w);
                    return Err(e);
                }
            };
            if let Err(e) = batch.values().iter().try_for_each(|v| w.write(v)) {
                self.abort(w);
                expect_done(self.parent.pull(true))?;
                return Err(e);
            }
        }
        let records = w.records();
        if let Err(e) = w.close() {
            if let Err(rm) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %rm, "load: removing partial index failed");
            }
            return Err(e);
        }
        tracing::debug!(path = %self.path.display(), records, "load: index written");
        Value::record(
            &self.zctx,
            vec![
                ("path", Value::string(self.path.to_string_lossy())),
                ("records", Value::uint64(records)),
            ],
        )
    }
}

impl Puller for Load {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        match (self.state, done) {
            (State::Finished, _) => Ok(None),
            (State::Emitted, _) => {
                self.state = State::Finished;
                Ok(None)
            }
            (State::Ready, true) => {
                self.state = State::Finished;
                expect_done(self.parent.pull(true))?;
                Ok(None)
            }
            (State::Ready, false) => match self.load() {
                Ok(summary) => {
                    self.state = State::Emitted;
                    Ok(Some(Batch::new(vec![summary])))
                }
                Err(e) => {
                    self.state = State::Finished;
                    Err(e)
                }
            },
        }
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}
