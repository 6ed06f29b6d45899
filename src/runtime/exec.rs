//! Driving an operator graph to completion

use crate::context::Context;
use crate::error::Result;
use crate::io::ValueWriter;
use crate::runtime::{expect_done, Puller};
use crate::value::Value;

/// Pull `root` to EOS and return every value it produced. The graph is
/// closed afterwards, whether or not the pulls succeeded.
pub fn collect<P: Puller + ?Sized>(root: &mut P) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    let res = drain(root, &mut out, None);
    finish(root, res)?;
    Ok(out)
}

/// Pull `root` to EOS, writing every value to `w`, and return the number
/// of values written.
///
/// When `ctx` is cancelled the graph receives a done and the
/// cancellation cause is returned.
pub fn copy<P, W>(ctx: &Context, root: &mut P, w: &mut W) -> Result<u64>
where
    P: Puller + ?Sized,
    W: ValueWriter + ?Sized,
{
    let res = drain(root, w, Some(ctx));
    let n = finish(root, res)?;
    w.flush()?;
    Ok(n)
}

fn drain<P, W>(root: &mut P, w: &mut W, ctx: Option<&Context>) -> Result<u64>
where
    P: Puller + ?Sized,
    W: ValueWriter + ?Sized,
{
    let mut n = 0;
    loop {
        if let Some(ctx) = ctx {
            if ctx.is_done() {
                expect_done(root.pull(true))?;
                return Err(ctx.cause());
            }
        }
        let batch = match root.pull(false)? {
            Some(b) => b,
            None => return Ok(n),
        };
        for v in batch.values() {
            if let Err(e) = w.write(v) {
                expect_done(root.pull(true))?;
                return Err(e);
            }
            n += 1;
        }
    }
}

fn finish<P: Puller + ?Sized>(root: &mut P, res: Result<u64>) -> Result<u64> {
    let closed = root.close();
    let n = res?;
    closed?;
    tracing::trace!(values = n, "query finished");
    Ok(n)
}
