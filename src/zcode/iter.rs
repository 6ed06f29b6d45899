use super::{decode_tagged, DecodeError};

/// One decoded tagged value. `body` is `None` for null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<'a> {
    pub body: Option<&'a [u8]>,
    pub container: bool,
}

/// Iterator over the tagged values of a container body. Each step is O(1):
/// it decodes one tag and skips the body.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    buf: &'a [u8],
}

impl<'a> Iter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns true when every value has been consumed
    pub fn done(&self) -> bool {
        self.buf.is_empty()
    }

    /// Like `next()` but treats exhaustion as an error. Used where a
    /// container is known to hold a fixed number of values.
    pub fn next_slot(&mut self) -> Result<Slot<'a>, DecodeError> {
        match self.next() {
            Some(r) => r,
            None => Err(DecodeError::UnexpectedEnd),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Slot<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match decode_tagged(self.buf) {
            Ok((slot, n)) => {
                self.buf = &self.buf[n..];
                Some(Ok(slot))
            }
            Err(e) => {
                // Poison the iterator so a corrupt body is reported once.
                self.buf = &[];
                Some(Err(e))
            }
        }
    }
}
