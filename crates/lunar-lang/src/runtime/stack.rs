//! Bounded LIFO used for call frames.
//!
//! Capacity is fixed at construction; pushing past it is a recoverable
//! `StackOverflow` error rather than an abort.

use crate::error::ScriptError;

#[derive(Debug, Clone)]
pub struct FastStack<T> {
    items:    Vec<T>,
    capacity: usize,
}

impl<T> FastStack<T> {
    pub fn new(capacity: usize) -> Self {
        Self { items: Vec::new(), capacity }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Push `item`, failing with `StackOverflow` once `capacity` items are held.
    pub fn push(&mut self, item: T) -> Result<(), ScriptError> {
        if self.items.len() >= self.capacity {
            return Err(ScriptError::StackOverflow);
        }
        if self.items.len() == self.items.capacity() {
            let grow = self.items.len().max(8).min(self.capacity - self.items.len());
            self.items.reserve_exact(grow);
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove and return the top item.
    ///
    /// # Panics
    /// Panics when the stack is empty; popping an empty frame stack is an
    /// interpreter bug, not a script error.
    pub fn pop(&mut self) -> T {
        match self.items.pop() {
            Some(item) => item,
            None => panic!("pop on empty FastStack"),
        }
    }

    pub fn try_pop(&mut self) -> Option<T> { self.items.pop() }

    pub fn peek(&self) -> Option<&T> { self.items.last() }

    pub fn peek_mut(&mut self) -> Option<&mut T> { self.items.last_mut() }

    /// Item at `index` counted from the bottom.
    pub fn get(&self, index: usize) -> Option<&T> { self.items.get(index) }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> { self.items.get_mut(index) }

    /// Drop items above `count`. A larger `count` leaves the stack untouched.
    pub fn truncate(&mut self, count: usize) { self.items.truncate(count); }

    pub fn clear(&mut self) { self.items.clear(); }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> { self.items.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_never_exceeds_capacity() {
        let mut s = FastStack::new(3);
        for i in 0..3 {
            s.push(i).unwrap();
        }
        assert!(s.items.capacity() <= 3);
        assert!(matches!(s.push(3), Err(ScriptError::StackOverflow)));
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn pop_on_empty_panics() {
        let mut s: FastStack<u8> = FastStack::new(4);
        s.pop();
    }
}
