//! Bounded largest-keys list.
//!
//! A fixed-capacity min-heap: the root is the weakest retained entry, so a
//! candidate is compared against it once and inserted in O(log n).

use crate::model::KeyMeta;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Heap entry. Greater means "ranks higher": more bytes first, then the
/// lexically smaller key, then the smaller shard. The order is total over
/// distinct (key, shard) pairs, so the retained set never depends on the
/// order candidates arrive in.
#[derive(Debug, Clone)]
struct Ranked(KeyMeta);

impl Ranked {
    fn bytes(&self) -> u64 {
        self.0.est_bytes.unwrap_or(0)
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes()
            .cmp(&other.bytes())
            .then_with(|| other.0.key.cmp(&self.0.key))
            .then_with(|| other.0.shard.cmp(&self.0.shard))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// The `capacity` largest keys seen so far, by estimated bytes.
#[derive(Debug, Clone)]
pub struct TopN {
    capacity: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl TopN {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offers a key. Keys without an estimate never enter and never evict.
    /// Returns whether the key was retained.
    pub fn offer(&mut self, meta: &KeyMeta) -> bool {
        if meta.est_bytes.is_none() || self.capacity == 0 {
            return false;
        }
        let candidate = Ranked(meta.clone());
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(candidate));
            return true;
        }
        match self.heap.peek() {
            Some(Reverse(weakest)) if candidate > *weakest => {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
                true
            }
            _ => false,
        }
    }

    /// Re-offers every entry of `other`.
    pub fn absorb(&mut self, other: TopN) {
        for Reverse(Ranked(meta)) in other.heap {
            self.offer(&meta);
        }
    }

    /// Entries, largest first.
    pub fn into_sorted(self) -> Vec<KeyMeta> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(meta))| meta)
            .collect()
    }

    fn ranked(&self) -> Vec<&Ranked> {
        let mut entries: Vec<&Ranked> = self.heap.iter().map(|Reverse(r)| r).collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
    }
}

impl PartialEq for TopN {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity
            && self
                .ranked()
                .iter()
                .zip(other.ranked())
                .all(|(a, b)| a.0 == b.0)
            && self.len() == other.len()
    }
}
