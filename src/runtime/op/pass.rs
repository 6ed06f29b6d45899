use crate::batch::Batch;
use crate::error::Result;
use crate::runtime::{BoxPuller, Puller};

/// Passes batches through unchanged
pub struct Pass {
    parent: BoxPuller,
}

impl Pass {
    pub fn new(parent: BoxPuller) -> Self {
        Self { parent }
    }
}

impl Puller for Pass {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        self.parent.pull(done)
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}
