//! Sampler Module
//!
//! Drives a bounded sample of a keyspace and turns it into a [`ScanReport`].
//!
//! ## Flow
//!
//! ```text
//! Topology ──> shards ──> scan_shard (SCAN → collect → estimate) ──┐
//!                                                                   │
//!        report <── merge <── PrefixAggregator per shard <── truncate
//! ```
//!
//! Standalone databases are scanned one after another, each with the budget
//! the previous ones left over. Cluster masters are scanned concurrently on
//! the calling task, each with the full budget, and the combined sample is
//! cut back round-robin. A failing shard costs only its own keys and adds one
//! line to `errors`.
//!
//! ## Example
//!
//! ```ignore
//! use keyscope::config::{NodeAddr, ScanConfig, Topology};
//! use keyscope::connection::TcpConnector;
//! use keyscope::sampler::Sampler;
//!
//! let sampler = Sampler::new(TcpConnector::default(), ScanConfig::default());
//! let topology = Topology::Standalone { node: NodeAddr::new("127.0.0.1", 6379) };
//! let report = sampler.sample(&topology).await?;
//! println!("{} keys sampled", report.sample_stats.sampled);
//! ```

pub mod collector;
pub mod driver;
pub mod estimator;

pub use collector::{CollectedBatch, MetadataCollector};
pub use driver::{ShardError, ShardScan};
pub use estimator::SizeEstimator;

use crate::aggregate::{Aggregate, PrefixAggregator};
use crate::config::{NodeAddr, ScanConfig, Topology};
use crate::connection::{Connector, Session};
use crate::error::{ClientError, ConfigError};
use crate::model::{Aggregates, SampleStats, ScanReport, Shard};
use crate::protocol::reply::ReplyError;
use crate::protocol::{Command, RespValue};
use driver::{close, scan_shard, truncate_round_robin, within};
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant as StdInstant;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bounded keyspace sampler.
///
/// Holds no connections between calls: every `sample` opens the sessions it
/// needs and closes them before returning.
pub struct Sampler<C> {
    connector: C,
    config: ScanConfig,
}

impl<C: Connector> Sampler<C> {
    pub fn new(connector: C, config: ScanConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Samples the store described by `topology`.
    ///
    /// Only invalid configuration is an error. Everything that goes wrong
    /// while talking to the store ends up in `sample_stats.errors`, and the
    /// report covers whatever was collected.
    pub async fn sample(&self, topology: &Topology) -> Result<ScanReport, ConfigError> {
        self.config.validate()?;
        topology.validate()?;

        let started = StdInstant::now();
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        info!(
            limit = self.config.sample_limit,
            scan_count = self.config.scan_count,
            "Starting keyspace sample"
        );

        let mut errors = Vec::new();
        let scans = match topology {
            Topology::Standalone { node } => self.scan_standalone(node, deadline).await,
            Topology::Cluster { nodes } => self.scan_cluster(nodes, deadline).await,
            Topology::Sentinel {
                sentinels,
                master_name,
            } => match self.resolve_master(sentinels, master_name, deadline).await {
                Ok(master) => {
                    info!(master = %master, "Resolved master through sentinel");
                    self.scan_standalone(&master, deadline).await
                }
                Err(e) => {
                    warn!(error = %e, "Could not resolve master");
                    errors.push(e);
                    Vec::new()
                }
            },
        };

        let report = self.build_report(scans, errors, started);
        info!(
            sampled = report.sample_stats.sampled,
            approx_total_keys = report.sample_stats.approx_total_keys,
            errors = report.sample_stats.errors.len(),
            duration_ms = report.sample_stats.duration_ms,
            "Sample complete"
        );
        Ok(report)
    }

    async fn scan_standalone(&self, node: &NodeAddr, deadline: Option<Instant>) -> Vec<ShardScan> {
        let mut scans = Vec::with_capacity(self.config.dbs.len());
        let mut collected = 0;
        for &db in &self.config.dbs {
            let budget = self.config.sample_limit.saturating_sub(collected);
            if budget == 0 {
                debug!(db, "Sample limit reached, skipping remaining databases");
                break;
            }
            // The shard that ran into the deadline already reported it.
            if deadline.is_some_and(|at| Instant::now() >= at) {
                break;
            }
            let scan = scan_shard(
                &self.connector,
                &self.config,
                node,
                db,
                Shard::Db(db),
                budget,
                deadline,
            )
            .await;
            collected += scan.keys.len();
            scans.push(scan);
        }
        scans
    }

    async fn scan_cluster(&self, seeds: &[NodeAddr], deadline: Option<Instant>) -> Vec<ShardScan> {
        let masters = if self.config.discover_cluster_nodes {
            match self.discover_masters(seeds, deadline).await {
                Some(masters) => masters,
                None => {
                    warn!("Cluster discovery failed, scanning the given nodes");
                    distinct(seeds)
                }
            }
        } else {
            distinct(seeds)
        };
        info!(masters = masters.len(), "Scanning cluster");

        let scans = masters.iter().map(|node| {
            scan_shard(
                &self.connector,
                &self.config,
                node,
                0,
                Shard::Node(node.to_string()),
                self.config.sample_limit,
                deadline,
            )
        });
        join_all(scans).await
    }

    /// Asks each seed in turn for `CLUSTER NODES` and returns the masters of
    /// the first usable answer.
    async fn discover_masters(
        &self,
        seeds: &[NodeAddr],
        deadline: Option<Instant>,
    ) -> Option<Vec<NodeAddr>> {
        for seed in seeds {
            let reply = self
                .ask(seed, Command::new("CLUSTER").arg("NODES"), deadline)
                .await;
            let text = match reply {
                Ok(RespValue::BulkString(text)) => String::from_utf8_lossy(&text).into_owned(),
                Ok(RespValue::SimpleString(text)) => text,
                Ok(other) => {
                    debug!(seed = %seed, reply = other.kind(), "CLUSTER NODES not available");
                    continue;
                }
                Err(e) => {
                    debug!(seed = %seed, error = %e, "CLUSTER NODES failed");
                    continue;
                }
            };
            let masters = parse_cluster_masters(&text);
            if !masters.is_empty() {
                return Some(masters);
            }
        }
        None
    }

    /// Asks each sentinel in turn for the address of `master_name`.
    async fn resolve_master(
        &self,
        sentinels: &[NodeAddr],
        master_name: &str,
        deadline: Option<Instant>,
    ) -> Result<NodeAddr, String> {
        let mut last_error = String::from("no sentinel answered");
        for sentinel in sentinels {
            let command = Command::new("SENTINEL")
                .arg("get-master-addr-by-name")
                .arg(master_name.to_string());
            match self.ask(sentinel, command, deadline).await {
                Ok(reply) => match parse_master_addr(&reply) {
                    Ok(Some(addr)) => return Ok(addr),
                    Ok(None) => {
                        last_error = format!(
                            "sentinel {}: master {:?} is unknown",
                            sentinel, master_name
                        );
                    }
                    Err(e) => last_error = format!("sentinel {}: {}", sentinel, e),
                },
                Err(e) => last_error = format!("sentinel {}: {}", sentinel, e),
            }
        }
        Err(last_error)
    }

    /// One command on a short-lived session.
    async fn ask(
        &self,
        node: &NodeAddr,
        command: Command,
        deadline: Option<Instant>,
    ) -> Result<RespValue, ShardError> {
        let mut session = within(deadline, self.connector.open(node, 0)).await?;
        let reply = within(deadline, session.query(command)).await;
        close(session).await;
        reply
    }

    fn build_report(
        &self,
        scans: Vec<ShardScan>,
        mut errors: Vec<String>,
        started: StdInstant,
    ) -> ScanReport {
        let approx_total_keys = scans.iter().map(|s| s.approx_keys).sum();
        let memory_usage_calls = scans.iter().map(|s| s.size_calls).sum();
        errors.extend(scans.iter().filter_map(|s| s.error.clone()));

        let mut samples: Vec<_> = scans.into_iter().map(|s| s.keys).collect();
        truncate_round_robin(&mut samples, self.config.sample_limit);

        let partials = samples.iter().map(|keys| {
            let mut aggregator = PrefixAggregator::new(&self.config);
            aggregator.extend(keys);
            aggregator.finish()
        });
        let merged = Aggregate::merge(partials);
        let sampled = merged.keys();
        let (prefixes, top_n) = merged.into_report_parts();

        ScanReport {
            sample_stats: SampleStats {
                duration_ms: started.elapsed().as_millis() as u64,
                sampled,
                approx_total_keys,
                coverage: SampleStats::coverage_of(sampled, approx_total_keys),
                memory_usage_calls,
                errors,
            },
            aggregates: Aggregates { prefixes },
            top_n,
        }
    }
}

/// Master addresses from a `CLUSTER NODES` listing, sorted.
///
/// Each line reads `<id> <ip:port@cport[,hostname]> <flags> ...`. Masters
/// flagged as failing, without address, or still in handshake are skipped.
pub fn parse_cluster_masters(text: &str) -> Vec<NodeAddr> {
    let mut masters: Vec<NodeAddr> = text
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _id = fields.next()?;
            let addr = fields.next()?;
            let flags = fields.next()?;

            let flags: Vec<&str> = flags.split(',').collect();
            let usable = flags.contains(&"master")
                && !flags
                    .iter()
                    .any(|f| matches!(*f, "fail" | "fail?" | "noaddr" | "handshake"));
            if !usable {
                return None;
            }

            let addr = addr.split(['@', ',']).next()?;
            addr.parse::<NodeAddr>().ok()
        })
        .collect();
    masters.sort();
    masters.dedup();
    masters
}

/// Decodes a `SENTINEL get-master-addr-by-name` reply. `Ok(None)` means the
/// sentinel does not monitor that name.
fn parse_master_addr(reply: &RespValue) -> Result<Option<NodeAddr>, ClientError> {
    const COMMAND: &str = "SENTINEL";
    let unexpected = |found| ClientError::reply(COMMAND, ReplyError::Unexpected { command: COMMAND, found });
    match reply {
        RespValue::Null => Ok(None),
        RespValue::Error(msg) => Err(ClientError::reply(COMMAND, ReplyError::Server(msg.clone()))),
        RespValue::Array(items) => match items.as_slice() {
            [host, port] => {
                let host = host.as_str().ok_or_else(|| unexpected(host.kind()))?;
                let port = port
                    .as_integer()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| unexpected(port.kind()))?;
                Ok(Some(NodeAddr::new(host, port)))
            }
            _ => Err(unexpected(reply.kind())),
        },
        other => Err(unexpected(other.kind())),
    }
}

/// `nodes` without repeats, first occurrence kept.
fn distinct(nodes: &[NodeAddr]) -> Vec<NodeAddr> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes
        .iter()
        .filter(|node| seen.insert(*node))
        .cloned()
        .collect()
}
