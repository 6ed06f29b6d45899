use std::io::Write;

use super::ValueWriter;
use crate::error::Result;
use crate::value::Value;

/// Writes each value on its own line in the compact record syntax
pub struct TextWriter<W: Write> {
    w: W,
}

impl<W: Write> TextWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write> ValueWriter for TextWriter<W> {
    fn write(&mut self, v: &Value) -> Result<()> {
        writeln!(self.w, "{}", v)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}
