//!
//! spindle-std-queue - FIFO Queue
//!
//! The ordered container the scheduler keeps its ready and blocked threads in.
//! Items are appended at the tail and taken from the head. Any item can also
//! be removed from the middle by equality, which for pointer-like items is
//! identity.
//!
//! ## Rotation
//!
//! A `dequeue` followed by an `enqueue` never reallocates: the slot freed at
//! the head is reused at the tail. The scheduler relies on this to rotate the
//! ready queue from inside the preemption signal handler.
//!

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Queue<T> {
    items: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an item at the tail
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return the item at the head
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Borrow the item at the head without removing it
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: PartialEq> Queue<T> {
    /// Remove the first item equal to `item`.
    ///
    /// Returns `None` and leaves the queue untouched when no item matches.
    pub fn delete(&mut self, item: &T) -> Option<T> {
        let pos = self.items.iter().position(|candidate| candidate == item)?;
        self.items.remove(pos)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.iter().any(|candidate| candidate == item)
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
