//! Batches: the unit of dataflow transport
//!
//! A `Batch` is an immutable, reference-counted sequence of values plus a
//! variable frame. Cloning a batch bumps its reference count; `unref`
//! releases one reference. Values hold reference-counted byte bodies, so a
//! consumer that keeps a value past `unref` keeps only that value's bytes
//! alive.

use std::sync::Arc;

use crate::value::Value;

/// Persistent stack of named variables.
///
/// Pushing returns a new frame that shares every older entry with the frame
/// it was pushed onto, so nested scopes extend their outer frame without
/// copying it.
#[derive(Clone, Default)]
pub struct Frame {
    head: Option<Arc<FrameNode>>,
    len: usize,
}

struct FrameNode {
    name: String,
    value: Value,
    next: Option<Arc<FrameNode>>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A frame with one more variable on top of this one
    pub fn push(&self, name: impl Into<String>, value: Value) -> Frame {
        Frame {
            head: Some(Arc::new(FrameNode {
                name: name.into(),
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The frame with the top `n` variables removed
    pub fn pop(&self, n: usize) -> Frame {
        let mut head = self.head.clone();
        let n = n.min(self.len);
        for _ in 0..n {
            head = head.and_then(|node| node.next.clone());
        }
        Frame {
            head,
            len: self.len - n,
        }
    }

    /// Innermost variable with the given name
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Variable by depth from the outermost entry (0 is the first pushed)
    pub fn get(&self, index: usize) -> Option<&Value> {
        if index >= self.len {
            return None;
        }
        self.iter().nth(self.len - 1 - index).map(|(_, v)| v)
    }

    /// Iterate from the innermost variable outward
    pub fn iter(&self) -> FrameIter<'_> {
        FrameIter {
            node: self.head.as_deref(),
        }
    }

    /// Returns true if `outer` is a suffix of this frame, i.e. this frame
    /// was built by pushing onto `outer`
    pub fn extends(&self, outer: &Frame) -> bool {
        if outer.len > self.len {
            return false;
        }
        let base = self.pop(self.len - outer.len);
        match (&base.head, &outer.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub struct FrameIter<'a> {
    node: Option<&'a FrameNode>,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = (&'a str, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some((node.name.as_str(), &node.value))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

struct BatchInner {
    values: Vec<Value>,
    vars: Frame,
    label: Option<usize>,
}

/// Reference-counted batch of values
#[derive(Clone)]
pub struct Batch(Arc<BatchInner>);

impl Batch {
    pub fn new(values: Vec<Value>) -> Self {
        Self::with_vars(values, Frame::new())
    }

    pub fn with_vars(values: Vec<Value>, vars: Frame) -> Self {
        Batch(Arc::new(BatchInner {
            values,
            vars,
            label: None,
        }))
    }

    /// A batch over `values` whose frame extends this batch's frame
    pub fn wrap(&self, values: Vec<Value>, vars: Frame) -> Self {
        debug_assert!(
            vars.len() >= self.0.vars.len(),
            "inner frame shorter than outer frame"
        );
        Self::with_vars(values, vars)
    }

    /// Same values and frame tagged with the index of the parent that
    /// produced them
    pub fn labeled(&self, label: usize) -> Self {
        Batch(Arc::new(BatchInner {
            values: self.0.values.clone(),
            vars: self.0.vars.clone(),
            label: Some(label),
        }))
    }

    pub fn values(&self) -> &[Value] {
        &self.0.values
    }

    pub fn vars(&self) -> &Frame {
        &self.0.vars
    }

    pub fn label(&self) -> Option<usize> {
        self.0.label
    }

    pub fn len(&self) -> usize {
        self.0.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values.is_empty()
    }

    /// Number of live references to this batch
    pub fn refs(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Release this reference
    pub fn unref(self) {
        drop(self)
    }

    /// Take the values out, copying only if the batch is still shared
    pub fn into_values(self) -> Vec<Value> {
        match Arc::try_unwrap(self.0) {
            Ok(inner) => inner.values,
            Err(shared) => shared.values.clone(),
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("values", &self.0.values)
            .field("vars", &self.0.vars.len())
            .field("label", &self.0.label)
            .finish()
    }
}
