//! Aggregation and Merge
//!
//! Each shard folds its keys into a private [`Aggregate`] through a
//! [`PrefixAggregator`]. Once every shard is done, the partials are combined
//! with [`Aggregate::merge`] on a single task, so no aggregate state is ever
//! shared between concurrent scans.
//!
//! ```text
//!  shard 0 ──> PrefixAggregator ──> Aggregate ─┐
//!  shard 1 ──> PrefixAggregator ──> Aggregate ─┼──> merge ──> report
//!  shard 2 ──> PrefixAggregator ──> Aggregate ─┘
//! ```
//!
//! `merge` behaves like one sequential fold over all keys:
//!
//! - `merge([x]) == x`
//! - associative and commutative over its inputs
//!
//! Counters and histograms are plain sums. Top-N lists are re-merged by
//! offering every retained entry to a fresh bounded heap whose ordering is
//! total, so no shard is favored by its position.

pub mod buckets;
pub mod prefix;
pub mod topn;

pub use buckets::{Buckets, PERSISTENT_LABEL};
pub use prefix::{prefixes_of, PrefixAgg, PrefixAggregator, TypeStats};
pub use topn::TopN;

use crate::model::{KeyMeta, KeyType};
use std::collections::{BTreeMap, HashMap};

/// Partial aggregation result of one shard (or of several, once merged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub(crate) prefixes: HashMap<String, PrefixAgg>,
    pub(crate) top: BTreeMap<KeyType, TopN>,
    pub(crate) keys: u64,
    pub(crate) top_capacity: usize,
}

impl Aggregate {
    /// An aggregate with no keys whose top-N lists hold `top_capacity` entries.
    pub fn empty(top_capacity: usize) -> Self {
        Self {
            top_capacity,
            ..Default::default()
        }
    }

    /// Number of keys folded in.
    pub fn keys(&self) -> u64 {
        self.keys
    }

    /// Combines partial results into one. The top-N capacity is the largest
    /// among the inputs; all partials of one call share it anyway.
    pub fn merge(parts: impl IntoIterator<Item = Aggregate>) -> Aggregate {
        let mut parts = parts.into_iter();
        let Some(mut merged) = parts.next() else {
            return Aggregate::default();
        };
        for part in parts {
            merged.absorb(part);
        }
        merged
    }

    fn absorb(&mut self, other: Aggregate) {
        if other.top_capacity > self.top_capacity {
            self.top_capacity = other.top_capacity;
            for top in self.top.values_mut() {
                let mut widened = TopN::new(other.top_capacity);
                widened.absorb(std::mem::replace(top, TopN::new(0)));
                *top = widened;
            }
        }

        self.keys += other.keys;
        for (prefix, agg) in other.prefixes {
            match self.prefixes.get_mut(&prefix) {
                Some(mine) => mine.absorb(&agg),
                None => {
                    self.prefixes.insert(prefix, agg);
                }
            }
        }

        let capacity = self.top_capacity;
        for (key_type, top) in other.top {
            self.top
                .entry(key_type)
                .or_insert_with(|| TopN::new(capacity))
                .absorb(top);
        }
    }

    /// Prefixes by descending estimated bytes (ties by prefix), and the
    /// per-type top-N lists largest first.
    pub fn into_report_parts(self) -> (Vec<PrefixAgg>, BTreeMap<KeyType, Vec<KeyMeta>>) {
        let mut prefixes: Vec<PrefixAgg> = self.prefixes.into_values().collect();
        prefixes.sort_by(|a, b| {
            b.est_bytes
                .cmp(&a.est_bytes)
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        let top = self
            .top
            .into_iter()
            .filter(|(_, top)| !top.is_empty())
            .map(|(key_type, top)| (key_type, top.into_sorted()))
            .collect();

        (prefixes, top)
    }
}
