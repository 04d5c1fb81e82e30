//! Binary min-heap used for both scheduler queues.
//!
//! Entries are ordered by `(sort_index, id)`. Ties on the sort index fall back
//! to the insertion id, so among equal keys the oldest entry always pops first.

use core::cmp::Ordering;

/// An entry that can be stored in a [`PriorityHeap`].
pub trait HeapNode {
    /// Primary ordering key (start time for timers, expiration for tasks).
    fn sort_index(&self) -> i64;

    /// Monotonic insertion id used to break ties.
    fn id(&self) -> u64;
}

/// Array-backed binary min-heap keyed by `(sort_index, id)`.
#[derive(Debug, Clone)]
pub struct PriorityHeap<T: HeapNode> {
    nodes: Vec<T>,
}

impl<T: HeapNode> Default for PriorityHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HeapNode> PriorityHeap<T> {
    /// Create an empty heap.
    #[inline]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Smallest entry, if any. O(1).
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    /// Mutable access to the smallest entry.
    ///
    /// Callers must not change the entry's ordering key through this reference.
    #[inline]
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.nodes.first_mut()
    }

    /// Insert an entry. O(log n).
    pub fn push(&mut self, node: T) {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.sift_up(index);
    }

    /// Remove and return the smallest entry. O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.nodes.swap(0, last);
        let first = self.nodes.pop();
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        first
    }

    /// Number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the heap holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over entries in storage (not sorted) order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    fn sift_up(&mut self, start: usize) {
        let mut index = start;
        while index > 0 {
            let parent = (index - 1) >> 1;
            if compare(&self.nodes[index], &self.nodes[parent]) == Ordering::Less {
                self.nodes.swap(index, parent);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, start: usize) {
        let mut index = start;
        let length = self.nodes.len();
        let half = length >> 1;
        while index < half {
            let left = index * 2 + 1;
            let right = left + 1;

            if compare(&self.nodes[left], &self.nodes[index]) == Ordering::Less {
                if right < length
                    && compare(&self.nodes[right], &self.nodes[left]) == Ordering::Less
                {
                    self.nodes.swap(right, index);
                    index = right;
                } else {
                    self.nodes.swap(left, index);
                    index = left;
                }
            } else if right < length
                && compare(&self.nodes[right], &self.nodes[index]) == Ordering::Less
            {
                self.nodes.swap(right, index);
                index = right;
            } else {
                return;
            }
        }
    }
}

/// Sort index first, then insertion id.
#[inline]
fn compare<T: HeapNode>(left: &T, right: &T) -> Ordering {
    left.sort_index()
        .cmp(&right.sort_index())
        .then_with(|| left.id().cmp(&right.id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Entry {
        sort: i64,
        id: u64,
    }

    impl HeapNode for Entry {
        fn sort_index(&self) -> i64 {
            self.sort
        }

        fn id(&self) -> u64 {
            self.id
        }
    }

    fn drain(heap: &mut PriorityHeap<Entry>) -> Vec<(i64, u64)> {
        let mut out = Vec::new();
        while let Some(entry) = heap.pop() {
            out.push((entry.sort, entry.id));
        }
        out
    }

    #[test]
    fn pops_in_sorted_order() {
        let mut heap = PriorityHeap::new();
        let sorts = [50, 3, 17, 3, 99, -4, 0, 17, 8, 42, 1];
        for (id, sort) in sorts.iter().enumerate() {
            heap.push(Entry { sort: *sort, id: id as u64 });
        }
        assert_eq!(heap.len(), sorts.len());

        let drained = drain(&mut heap);
        let mut expected: Vec<(i64, u64)> = sorts
            .iter()
            .enumerate()
            .map(|(id, sort)| (*sort, id as u64))
            .collect();
        expected.sort_unstable();
        assert_eq!(drained, expected);
        assert!(heap.is_empty());
    }

    #[test]
    fn equal_sort_keys_pop_fifo() {
        let mut heap = PriorityHeap::new();
        for id in 0..16 {
            heap.push(Entry { sort: 7, id });
        }
        let ids: Vec<u64> = drain(&mut heap).into_iter().map(|(_, id)| id).collect();
        assert_eq!(ids, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn interleaved_push_pop_keeps_minimum_on_top() {
        let mut heap = PriorityHeap::new();
        let mut next_id = 0;
        let mut push = |heap: &mut PriorityHeap<Entry>, sort: i64| {
            heap.push(Entry { sort, id: next_id });
            next_id += 1;
        };

        push(&mut heap, 10);
        push(&mut heap, 5);
        push(&mut heap, 7);
        assert_eq!(heap.pop().map(|entry| entry.sort), Some(5));
        push(&mut heap, 1);
        push(&mut heap, 12);
        assert_eq!(heap.peek().map(|entry| entry.sort), Some(1));
        assert_eq!(heap.pop().map(|entry| entry.sort), Some(1));
        assert_eq!(heap.pop().map(|entry| entry.sort), Some(7));
        assert_eq!(heap.pop().map(|entry| entry.sort), Some(10));
        assert_eq!(heap.pop().map(|entry| entry.sort), Some(12));
        assert_eq!(heap.pop(), None);
        assert_eq!(heap.peek(), None);
    }
}
