//! Latest-wins pending slot
//!
//! Requests that arrive while work is in progress are parked here. Only the
//! most recent one survives; earlier ones are dropped, not batched.

use std::cell::Cell;

/// Holds at most one pending value
pub struct PendingSlot<T> {
    value: Cell<Option<T>>,
}

impl<T> PendingSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Cell::new(None),
        }
    }

    /// Park `value`, returning the one it replaced
    pub fn offer(&self, value: T) -> Option<T> {
        self.value.replace(Some(value))
    }

    /// Remove and return the pending value
    pub fn take(&self) -> Option<T> {
        self.value.take()
    }

    pub fn is_empty(&self) -> bool {
        let value = self.value.take();
        let empty = value.is_none();
        self.value.set(value);
        empty
    }
}

impl<T: Copy> PendingSlot<T> {
    /// The pending value, left in place
    pub fn peek(&self) -> Option<T> {
        self.value.get()
    }
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
