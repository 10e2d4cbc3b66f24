//! Bounded read-ahead buffer between the coordinator and the consumer.
//!
//! The buffer never refuses an item: `accept` always stores it and reports
//! whether capacity remains, leaving it to the caller to stop producing.

use std::collections::VecDeque;

/// Weight of one item against the high-water mark.
pub(crate) type Measure<T> = fn(&T) -> usize;

/// Object-mode measure: every item counts one.
pub(crate) fn count_one<T>(_: &T) -> usize {
    1
}

/// Byte-mode measure: an item counts its length.
pub(crate) fn count_bytes<B: AsRef<[u8]>>(chunk: &B) -> usize {
    chunk.as_ref().len()
}

pub(crate) struct ReadBuffer<T> {
    items: VecDeque<T>,
    /// Sum of `measure` over `items`.
    level: usize,
    high_water_mark: usize,
    measure: Measure<T>,
}

impl<T> ReadBuffer<T> {
    pub(crate) fn new(high_water_mark: usize, measure: Measure<T>) -> Self {
        Self {
            items: VecDeque::with_capacity(high_water_mark.min(64)),
            level: 0,
            high_water_mark,
            measure,
        }
    }

    /// Stores `item` and returns whether more capacity remains.
    pub(crate) fn accept(&mut self, item: T) -> bool {
        self.level += (self.measure)(&item);
        self.items.push_back(item);
        self.has_capacity()
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.level -= (self.measure)(&item);
        Some(item)
    }

    #[inline]
    pub(crate) fn has_capacity(&self) -> bool {
        self.level < self.high_water_mark
    }

    /// Whether the producer should be asked for more. An empty buffer always
    /// wants more, so a zero high-water mark still serves a waiting consumer.
    #[inline]
    pub(crate) fn wants_more(&self) -> bool {
        self.items.is_empty() || self.has_capacity()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.level = 0;
    }
}
