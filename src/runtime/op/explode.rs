use crate::batch::Batch;
use crate::error::Result;
use crate::runtime::{expect_done, BoxPuller, Platoon, Puller};
use crate::value::{Field, Type, TypeContext, TypeDesc, Value};

/// Emits every sub-value of type `ty` found in the input values, each
/// wrapped as the single-field record `{<name>: sub-value}`.
///
/// Matching stops the descent: a matched container is emitted whole and
/// its own children are not visited.
pub struct Explode {
    parent: BoxPuller,
    ty: Type,
    out_ty: Type,
    platoon: Platoon,
}

impl Explode {
    pub fn new(zctx: &TypeContext, parent: BoxPuller, ty: Type, name: &str) -> Result<Self> {
        let out_ty = zctx.lookup_record(vec![Field::new(name, ty.clone())])?;
        Ok(Self {
            parent,
            ty,
            out_ty,
            platoon: Platoon::new(),
        })
    }

    fn walk(&self, v: &Value, out: &mut Vec<Value>) -> Result<()> {
        if *v.ty() == self.ty {
            out.push(Value::record_of(self.out_ty.clone(), std::slice::from_ref(v))?);
            return Ok(());
        }
        if v.is_null() {
            return Ok(());
        }
        match v.ty().under().desc() {
            TypeDesc::Record(_) => {
                for (_, field) in v.fields()? {
                    self.walk(&field, out)?;
                }
            }
            TypeDesc::Array(_) | TypeDesc::Set(_) => {
                for elem in v.elements()? {
                    self.walk(&elem, out)?;
                }
            }
            TypeDesc::Map(_, _) => {
                for (key, val) in v.map_entries()? {
                    self.walk(&key, out)?;
                    self.walk(&val, out)?;
                }
            }
            TypeDesc::Union(_) => {
                let member = v.clone().unwrap_union()?;
                self.walk(&member, out)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Puller for Explode {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.platoon.settled(done) {
            return Ok(None);
        }
        if done {
            expect_done(self.parent.pull(true))?;
            return Ok(None);
        }
        loop {
            let batch = match self.parent.pull(false) {
                Ok(Some(b)) => b,
                other => return self.platoon.observe(other),
            };
            let mut out = Vec::new();
            for v in batch.values() {
                if let Err(e) = self.walk(v, &mut out) {
                    self.platoon.fail();
                    expect_done(self.parent.pull(true))?;
                    return Err(e);
                }
            }
            if !out.is_empty() {
                return Ok(Some(batch.wrap(out, batch.vars().clone())));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.parent.close()
    }
}
