//! Record stream readers and writers
//!
//! Every output format implements [`ValueWriter`], so the query driver
//! can copy a result stream to any of them.

pub mod json;
pub mod text;

pub use json::{from_json, to_json, JsonWriter, NdjsonReader};
pub use text::TextWriter;

use crate::error::Result;
use crate::value::Value;

/// Sink for a stream of values
pub trait ValueWriter {
    fn write(&mut self, v: &Value) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<W: ValueWriter + ?Sized> ValueWriter for Box<W> {
    fn write(&mut self, v: &Value) -> Result<()> {
        (**self).write(v)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<W: std::io::Write> ValueWriter for crate::zngio::Writer<W> {
    fn write(&mut self, v: &Value) -> Result<()> {
        crate::zngio::Writer::write(self, v)
    }

    fn flush(&mut self) -> Result<()> {
        crate::zngio::Writer::flush(self)
    }
}

impl ValueWriter for crate::microindex::Writer {
    fn write(&mut self, v: &Value) -> Result<()> {
        crate::microindex::Writer::write(self, v)
    }
}

/// Collects values in memory
impl ValueWriter for Vec<Value> {
    fn write(&mut self, v: &Value) -> Result<()> {
        self.push(v.clone());
        Ok(())
    }
}
