use std::collections::VecDeque;

/// A fixed-capacity FIFO window over the most recently added values.
///
/// Once full, adding a value drops the oldest one, so the buffer always holds the last
/// `capacity` values in insertion order.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    history: VecDeque<T>,
    /// Max. number of values to keep in the history.
    capacity: usize,
}

impl<T> RollingHistory<T> {
    /// Creates an empty history that keeps the last `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "history capacity must be at least 1");
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, value: T) {
        self.history.push_back(value);

        if self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.history.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over the buffered values, oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
