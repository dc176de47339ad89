use std::collections::VecDeque;

/// Ring list that keeps at most `capacity` of the most recently pushed items.
#[derive(Debug, Clone, Default)]
pub struct BoundedList<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> BoundedList<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `item`, evicting the oldest entry once full. A zero capacity
    /// list only counts what it drops.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(item);
    }

    pub fn first(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items evicted or refused over the list's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_list() {
        let mut list = BoundedList::new(5);
        for i in 0..20 {
            list.push(i * 100);
        }
        let kept: Vec<i32> = list.iter().copied().collect();
        assert_eq!(kept, vec![1500, 1600, 1700, 1800, 1900]);
        assert_eq!(list.first(), Some(&1500));
        assert_eq!(list.last(), Some(&1900));
        assert_eq!(list.dropped(), 15);
    }

    #[test]
    fn test_zero_capacity() {
        let mut list = BoundedList::new(0);
        list.push("x");
        assert!(list.is_empty());
        assert_eq!(list.dropped(), 1);
    }
}
