//! FIFO bucket of jobs sharing one priority

use crate::error::QueueError;
use std::collections::VecDeque;
use std::fmt;

/// A unit of work: runs once, takes nothing, returns nothing.
pub type Job = Box<dyn FnOnce()>;

/// Ordered list of items that share a priority level.
///
/// Items come out in the order they went in.
pub struct Bucket<T = Job> {
    items: VecDeque<T>,
}

impl<T> Bucket<T> {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Append an item to the tail
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return the head item
    ///
    /// Fails with [`QueueError::Empty`] when the bucket holds nothing.
    pub fn pop_front(&mut self) -> Result<T, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket").field("len", &self.items.len()).finish()
    }
}
