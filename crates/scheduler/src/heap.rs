//! Priority-indexed binary max-heap
//!
//! Holds at most one value per priority. A side index maps each live priority
//! to its position in the heap array, so "is there already a bucket for this
//! priority" is a single hash lookup while insertion and root extraction stay
//! O(log n).

use crate::error::QueueError;
use crate::priority::Priority;
use std::collections::HashMap;

#[derive(Debug)]
struct Entry<T> {
    priority: Priority,
    value: T,
}

/// Binary max-heap keyed by unique priorities.
///
/// The root always holds the numerically highest priority.
#[derive(Debug)]
pub struct PriorityIndexedHeap<T> {
    entries: Vec<Entry<T>>,
    /// priority -> position in `entries`
    index: HashMap<Priority, usize>,
}

fn parent(index: usize) -> usize {
    (index - 1) / 2
}

fn left_child(index: usize) -> usize {
    2 * index + 1
}

fn right_child(index: usize) -> usize {
    2 * index + 2
}

impl<T> PriorityIndexedHeap<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }

    /// Insert `value` under `priority`
    ///
    /// The caller must make sure no entry for `priority` exists yet; use
    /// [`get_mut`](Self::get_mut) first and append to the existing value.
    pub fn add(&mut self, priority: Priority, value: T) {
        debug_assert!(
            !self.index.contains_key(&priority),
            "priority {priority} already has an entry"
        );

        let position = self.entries.len();
        self.entries.push(Entry { priority, value });
        self.index.insert(priority, position);
        self.sift_up(position);
    }

    /// Value at the root without removing it
    pub fn peek(&self) -> Result<&T, QueueError> {
        self.entries.first().map(|entry| &entry.value).ok_or(QueueError::Empty)
    }

    /// Mutable access to the value at the root
    pub fn peek_mut(&mut self) -> Result<&mut T, QueueError> {
        self.entries.first_mut().map(|entry| &mut entry.value).ok_or(QueueError::Empty)
    }

    /// Priority of the root entry, if any
    pub fn peek_priority(&self) -> Option<Priority> {
        self.entries.first().map(|entry| entry.priority)
    }

    /// Remove and return the value at the root
    pub fn poll(&mut self) -> Result<T, QueueError> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }

        let top = self.entries.swap_remove(0);
        self.index.remove(&top.priority);

        if !self.entries.is_empty() {
            let moved = self.entries[0].priority;
            self.index.insert(moved, 0);
            self.sift_down(0);
        }

        Ok(top.value)
    }

    /// Value stored at `priority`
    pub fn get(&self, priority: Priority) -> Option<&T> {
        self.index.get(&priority).map(|&position| &self.entries[position].value)
    }

    /// Mutable value stored at `priority`
    pub fn get_mut(&mut self, priority: Priority) -> Option<&mut T> {
        let position = *self.index.get(&priority)?;
        Some(&mut self.entries[position].value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct priorities currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over all values in heap-array order (not priority order)
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.value)
    }

    /// Raise every live priority by one.
    ///
    /// Index keys are renamed from the highest down so that renaming `p` to
    /// `p + 1` never lands on a key that has not been moved yet. Heap
    /// positions stay put: a uniform shift keeps the max-heap property.
    pub fn rising(&mut self) -> Result<(), QueueError> {
        if let Some(top) = self.peek_priority() {
            if top.raised().is_none() {
                return Err(QueueError::PriorityOverflow(top));
            }
        }

        let mut keys: Vec<Priority> = self.index.keys().copied().collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));

        for key in keys {
            if let Some(position) = self.index.remove(&key) {
                // The root check above guarantees every key below it can be raised.
                let raised = Priority(key.0 + 1);
                self.index.insert(raised, position);
            }
        }

        for entry in &mut self.entries {
            entry.priority = Priority(entry.priority.0 + 1);
        }

        Ok(())
    }

    /// `first` may sit above `second`
    fn in_correct_order(&self, first: usize, second: usize) -> bool {
        self.entries[first].priority >= self.entries[second].priority
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.index.insert(self.entries[a].priority, a);
        self.index.insert(self.entries[b].priority, b);
    }

    fn sift_up(&mut self, mut current: usize) {
        while current > 0 && !self.in_correct_order(parent(current), current) {
            let up = parent(current);
            self.swap(current, up);
            current = up;
        }
    }

    fn sift_down(&mut self, mut current: usize) {
        let len = self.entries.len();

        while left_child(current) < len {
            let left = left_child(current);
            let right = right_child(current);

            // Ties go to the right child.
            let next = if right < len && self.in_correct_order(right, left) { right } else { left };

            if self.in_correct_order(current, next) {
                break;
            }

            self.swap(current, next);
            current = next;
        }
    }
}

impl<T> Default for PriorityIndexedHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
