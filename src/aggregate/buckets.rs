//! Half-open histogram buckets over seconds.

/// Label used for keys without expiry in TTL histograms.
pub const PERSISTENT_LABEL: &str = "persistent";

/// Bucket boundaries with precomputed labels.
///
/// Boundaries `[0, 60, 300]` describe `[0,60)`, `[60,300)` and `[300,∞)`,
/// labelled `0-60s`, `60-300s` and `300s+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    bounds: Vec<u64>,
    labels: Vec<String>,
}

impl Buckets {
    /// `bounds` must be strictly increasing and start at 0; `ScanConfig`
    /// validation guarantees this before a `Buckets` is ever built.
    pub fn new(bounds: &[u64]) -> Self {
        let labels = bounds
            .iter()
            .enumerate()
            .map(|(i, lo)| match bounds.get(i + 1) {
                Some(hi) => format!("{}-{}s", lo, hi),
                None => format!("{}s+", lo),
            })
            .collect();
        Self {
            bounds: bounds.to_vec(),
            labels,
        }
    }

    /// Label of the bucket holding `secs`.
    pub fn label_secs(&self, secs: u64) -> &str {
        let idx = self.bounds.partition_point(|&b| b <= secs).saturating_sub(1);
        &self.labels[idx]
    }

    /// Label of the bucket holding `ms` milliseconds. Fractions of a second
    /// round down, which keeps the intervals half-open on whole seconds.
    pub fn label_ms(&self, ms: u64) -> &str {
        self.label_secs(ms / 1000)
    }
}
