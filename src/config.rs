//! Sampling configuration and store topology.
//!
//! Both are plain structs with defaults and a `validate` step. Validation is
//! the only place a [`ConfigError`] comes from, and it runs before the sampler
//! opens a single connection.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Address of one store node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = ConfigError;

    /// Parses `host:port`. The port is taken after the last colon so bare
    /// IPv6 hosts such as `::1:6379` still split correctly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ConfigError::InvalidAddress(s.to_string()));
        }
        Ok(NodeAddr::new(host, port))
    }
}

/// Credentials handed through to every session. Treated as opaque.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the store is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// A single server; shards are the configured DB indices.
    Standalone { node: NodeAddr },
    /// A cluster; shards are master nodes. `nodes` are seeds for discovery.
    Cluster { nodes: Vec<NodeAddr> },
    /// A sentinel-managed master, resolved by name then scanned standalone.
    Sentinel {
        sentinels: Vec<NodeAddr>,
        master_name: String,
    },
}

impl Topology {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Topology::Standalone { .. } => Ok(()),
            Topology::Cluster { nodes } if nodes.is_empty() => Err(ConfigError::EmptyNodeList),
            Topology::Cluster { .. } => Ok(()),
            Topology::Sentinel { sentinels, .. } if sentinels.is_empty() => {
                Err(ConfigError::EmptySentinelList)
            }
            Topology::Sentinel { master_name, .. } if master_name.trim().is_empty() => {
                Err(ConfigError::MissingMasterName)
            }
            Topology::Sentinel { .. } => Ok(()),
        }
    }
}

/// Configuration for one sampling call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// DB indices scanned in standalone and sentinel mode (default: `[0]`)
    pub dbs: Vec<u32>,

    /// Upper bound on the number of sampled keys across all shards
    pub sample_limit: usize,

    /// COUNT hint passed to every SCAN call
    pub scan_count: usize,

    /// TTL histogram boundaries in seconds, strictly increasing from 0
    pub ttl_buckets: Vec<u64>,

    /// Idle-time histogram boundaries in seconds, strictly increasing from 0
    pub idle_buckets: Vec<u64>,

    /// Bound of each per-type largest-keys list
    pub size_top_n: usize,

    /// Separator between key segments
    pub delimiter: String,

    /// Deepest prefix level aggregated
    pub max_depth: usize,

    /// Every Nth key of a batch gets a size estimate
    pub size_stride: usize,

    /// Optional SCAN MATCH glob
    pub match_pattern: Option<String>,

    /// Optional wall-clock budget for the whole call
    pub deadline: Option<Duration>,

    /// Resolve cluster masters with CLUSTER NODES instead of trusting the seeds
    pub discover_cluster_nodes: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dbs: vec![0],
            sample_limit: 10_000,
            scan_count: 500,
            ttl_buckets: vec![0, 60, 300, 3_600, 86_400],
            idle_buckets: vec![0, 60, 3_600, 86_400],
            size_top_n: 20,
            delimiter: ":".to_string(),
            max_depth: 3,
            size_stride: 10,
            match_pattern: None,
            deadline: None,
            discover_cluster_nodes: true,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dbs.is_empty() {
            return Err(ConfigError::EmptyDbList);
        }
        let mut seen = HashSet::with_capacity(self.dbs.len());
        if let Some(&db) = self.dbs.iter().find(|&&db| !seen.insert(db)) {
            return Err(ConfigError::DuplicateDb(db));
        }
        if self.sample_limit == 0 {
            return Err(ConfigError::Zero("sample limit"));
        }
        if self.scan_count == 0 {
            return Err(ConfigError::Zero("scan count"));
        }
        if self.size_stride == 0 {
            return Err(ConfigError::Zero("size stride"));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Zero("max depth"));
        }
        if self.delimiter.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        validate_buckets("ttl", &self.ttl_buckets)?;
        validate_buckets("idle", &self.idle_buckets)?;
        Ok(())
    }
}

fn validate_buckets(name: &'static str, bounds: &[u64]) -> Result<(), ConfigError> {
    match bounds.first() {
        None => Err(ConfigError::InvalidBuckets {
            name,
            reason: "no boundaries",
        }),
        Some(&first) if first != 0 => Err(ConfigError::InvalidBuckets {
            name,
            reason: "first boundary must be 0",
        }),
        Some(_) if bounds.windows(2).any(|w| w[0] >= w[1]) => Err(ConfigError::InvalidBuckets {
            name,
            reason: "boundaries must be strictly increasing",
        }),
        Some(_) => Ok(()),
    }
}
