use super::{append_container, append_primitive, container_tag, size_of_uvarint};

/// Incremental encoder for nested values.
///
/// `begin_container` reserves a one-byte tag slot; `end_container` computes
/// the body size and widens the slot in place when the final tag needs more
/// than one varint byte.
#[derive(Debug, Default, Clone)]
pub struct Builder {
    bytes: Vec<u8>,
    containers: Vec<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(cap),
            containers: Vec::new(),
        }
    }

    /// Open a container; values appended until the matching
    /// `end_container` form its body
    pub fn begin_container(&mut self) {
        self.containers.push(self.bytes.len());
        self.bytes.push(0);
    }

    /// Close the innermost open container.
    ///
    /// # Panics
    ///
    /// Panics if there is no open container.
    pub fn end_container(&mut self) {
        let slot = self
            .containers
            .pop()
            .expect("zcode builder: end_container without begin_container");
        let body_len = self.bytes.len() - slot - 1;
        let tag = container_tag(body_len);
        let n = size_of_uvarint(tag);
        if n > 1 {
            self.bytes
                .splice(slot + 1..slot + 1, std::iter::repeat(0u8).take(n - 1));
        }
        let mut encoded = Vec::with_capacity(n);
        super::append_uvarint(&mut encoded, tag);
        self.bytes[slot..slot + n].copy_from_slice(&encoded);
    }

    pub fn append_primitive(&mut self, body: Option<&[u8]>) {
        append_primitive(&mut self.bytes, body);
    }

    /// Append a container whose body is already encoded
    pub fn append_container(&mut self, body: Option<&[u8]>) {
        append_container(&mut self.bytes, body);
    }

    pub fn append(&mut self, body: Option<&[u8]>, container: bool) {
        super::append(&mut self.bytes, body, container);
    }

    /// Number of containers still open
    pub fn depth(&self) -> usize {
        self.containers.len()
    }

    /// The encoded bytes. Only meaningful once every container is closed.
    pub fn bytes(&self) -> &[u8] {
        debug_assert!(self.containers.is_empty(), "zcode builder has open containers");
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert!(self.containers.is_empty(), "zcode builder has open containers");
        self.bytes
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
        self.containers.clear();
    }
}
