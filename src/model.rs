//! Report data model.
//!
//! Everything here is metadata: key names, types, TTLs, idle times and size
//! estimates. No value content is ever stored in these types.

use crate::aggregate::PrefixAgg;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Data type of a key, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    Zset,
    Stream,
    Bitmap,
    Other,
}

impl KeyType {
    /// Maps a `TYPE` reply to the closed set. Module types become `Other`.
    pub fn from_type_reply(name: &str) -> Self {
        match name {
            "string" => KeyType::String,
            "hash" => KeyType::Hash,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::Zset,
            "stream" => KeyType::Stream,
            "bitmap" => KeyType::Bitmap,
            _ => KeyType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::Zset => "zset",
            KeyType::Stream => "stream",
            KeyType::Bitmap => "bitmap",
            KeyType::Other => "other",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently scanned unit of the keyspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shard {
    /// Logical database index of a standalone server.
    Db(u32),
    /// Master node of a cluster, as `host:port`.
    Node(String),
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shard::Db(db) => write!(f, "db {}", db),
            Shard::Node(addr) => write!(f, "node {}", addr),
        }
    }
}

/// Metadata collected for one scanned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMeta {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    /// `None` iff the store reports no expiry.
    pub ttl_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_sec: Option<u64>,
    /// `None` when no estimate was taken or the estimate failed. Never zero
    /// as a stand-in for unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_bytes: Option<u64>,
    pub shard: Shard,
}

/// Run-level statistics of one sampling call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleStats {
    pub duration_ms: u64,
    pub sampled: u64,
    pub approx_total_keys: u64,
    pub coverage: f64,
    pub memory_usage_calls: u64,
    pub errors: Vec<String>,
}

impl SampleStats {
    /// `sampled / approx_total`, clamped to `[0, 1]`; zero when nothing is known.
    pub fn coverage_of(sampled: u64, approx_total: u64) -> f64 {
        if approx_total == 0 {
            return 0.0;
        }
        (sampled as f64 / approx_total as f64).clamp(0.0, 1.0)
    }
}

/// Prefix aggregates, ordered by descending estimated bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregates {
    pub prefixes: Vec<PrefixAgg>,
}

/// The complete result of one sampling call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub sample_stats: SampleStats,
    pub aggregates: Aggregates,
    pub top_n: BTreeMap<KeyType, Vec<KeyMeta>>,
}
