//! Mark Stack - Explicit work list for tracing
//!
//! Tracing never recurses; grey objects wait here until their slots are
//! scanned. A LIFO keeps the working set small on deep graphs, and the
//! stack survives between background marking quanta.

use crate::object::Address;

/// MarkStack - grey object work list
#[derive(Debug, Default)]
pub struct MarkStack {
    stack: Vec<Address>,
    pushed: u64,
    popped: u64,
    max_depth: usize,
}

impl MarkStack {
    /// Create new mark stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a grey object
    #[inline]
    pub fn push(&mut self, object: Address) {
        self.stack.push(object);
        self.pushed += 1;
        if self.stack.len() > self.max_depth {
            self.max_depth = self.stack.len();
        }
    }

    /// Pop the next object to scan
    #[inline]
    pub fn pop(&mut self) -> Option<Address> {
        let object = self.stack.pop();
        if object.is_some() {
            self.popped += 1;
        }
        object
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Current depth
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Deepest the stack has been
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Total pushes
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Total pops
    pub fn popped(&self) -> u64 {
        self.popped
    }

    /// Drop pending work
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
