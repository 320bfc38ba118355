//! Streaming fold of key metadata into prefix statistics.

use crate::aggregate::buckets::{Buckets, PERSISTENT_LABEL};
use crate::aggregate::topn::TopN;
use crate::aggregate::Aggregate;
use crate::config::ScanConfig;
use crate::model::{KeyMeta, KeyType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Count and estimated bytes of one data type under a prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    pub count: u64,
    pub est_bytes: u64,
}

/// Statistics of every sampled key under one prefix.
///
/// `est_bytes` sums only keys that carried an estimate; `estimated_keys`
/// says how many those were.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixAgg {
    pub prefix: String,
    pub count: u64,
    pub est_bytes: u64,
    pub estimated_keys: u64,
    pub ttl_hist: BTreeMap<String, u64>,
    pub idle_hist: BTreeMap<String, u64>,
    pub by_type: BTreeMap<KeyType, TypeStats>,
}

impl PrefixAgg {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    fn record(&mut self, meta: &KeyMeta, ttl_label: &str, idle_label: Option<&str>) {
        self.count += 1;
        let bytes = meta.est_bytes.unwrap_or(0);
        if meta.est_bytes.is_some() {
            self.est_bytes += bytes;
            self.estimated_keys += 1;
        }
        *self.ttl_hist.entry(ttl_label.to_string()).or_insert(0) += 1;
        if let Some(label) = idle_label {
            *self.idle_hist.entry(label.to_string()).or_insert(0) += 1;
        }
        let by_type = self.by_type.entry(meta.key_type).or_default();
        by_type.count += 1;
        by_type.est_bytes += bytes;
    }

    /// Adds every counter of `other` into `self`.
    pub fn absorb(&mut self, other: &PrefixAgg) {
        self.count += other.count;
        self.est_bytes += other.est_bytes;
        self.estimated_keys += other.estimated_keys;
        for (label, n) in &other.ttl_hist {
            *self.ttl_hist.entry(label.clone()).or_insert(0) += n;
        }
        for (label, n) in &other.idle_hist {
            *self.idle_hist.entry(label.clone()).or_insert(0) += n;
        }
        for (key_type, stats) in &other.by_type {
            let mine = self.by_type.entry(*key_type).or_default();
            mine.count += stats.count;
            mine.est_bytes += stats.est_bytes;
        }
    }
}

/// Prefixes of `key` formed by its first `1..=min(segments, max_depth)`
/// segments, shallowest first.
///
/// `a:b:c:d` with depth 3 yields `a`, `a:b`, `a:b:c`; `a:1` yields `a` and
/// `a:1`. A key without any delimiter is a single segment.
pub fn prefixes_of<'a>(key: &'a str, delimiter: &str, max_depth: usize) -> Vec<&'a str> {
    key.match_indices(delimiter)
        .map(|(at, _)| at)
        .chain(std::iter::once(key.len()))
        .take(max_depth)
        .map(|end| &key[..end])
        .collect()
}

/// Folds [`KeyMeta`] into prefix aggregates and per-type top-N lists.
///
/// One aggregator serves one shard; shard results are combined with
/// [`Aggregate::merge`].
#[derive(Debug, Clone)]
pub struct PrefixAggregator {
    delimiter: String,
    max_depth: usize,
    ttl_buckets: Buckets,
    idle_buckets: Buckets,
    state: Aggregate,
}

impl PrefixAggregator {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            delimiter: config.delimiter.clone(),
            max_depth: config.max_depth,
            ttl_buckets: Buckets::new(&config.ttl_buckets),
            idle_buckets: Buckets::new(&config.idle_buckets),
            state: Aggregate::empty(config.size_top_n),
        }
    }

    /// Folds one key into every prefix it belongs to.
    pub fn add(&mut self, meta: &KeyMeta) {
        let ttl_label = match meta.ttl_ms {
            Some(ms) => self.ttl_buckets.label_ms(ms),
            None => PERSISTENT_LABEL,
        };
        let idle_label = meta.idle_sec.map(|secs| self.idle_buckets.label_secs(secs));

        for prefix in prefixes_of(&meta.key, &self.delimiter, self.max_depth) {
            // Avoid allocating the prefix string for the common case where it
            // already exists.
            match self.state.prefixes.get_mut(prefix) {
                Some(agg) => agg.record(meta, ttl_label, idle_label),
                None => {
                    let mut agg = PrefixAgg::new(prefix);
                    agg.record(meta, ttl_label, idle_label);
                    self.state.prefixes.insert(prefix.to_string(), agg);
                }
            }
        }

        if meta.est_bytes.is_some() {
            let capacity = self.state.top_capacity;
            self.state
                .top
                .entry(meta.key_type)
                .or_insert_with(|| TopN::new(capacity))
                .offer(meta);
        }
        self.state.keys += 1;
    }

    pub fn extend<'a>(&mut self, metas: impl IntoIterator<Item = &'a KeyMeta>) {
        for meta in metas {
            self.add(meta);
        }
    }

    /// Number of keys folded so far.
    pub fn keys(&self) -> u64 {
        self.state.keys
    }

    pub fn finish(self) -> Aggregate {
        self.state
    }
}
