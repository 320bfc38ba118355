//! # Keyscope - Bounded Keyspace Sampling for Redis-Compatible Stores
//!
//! Keyscope walks a live keyspace with cursor-based `SCAN`, looks up each
//! sampled key's type, expiry, idle time and approximate size, and folds the
//! result into per-prefix statistics and per-type largest-key lists. The
//! amount of work is bounded by a key budget and an optional deadline, so it
//! is safe to point at production servers.
//!
//! ## Features
//!
//! - **Bounded**: never samples more than the configured limit, never blocks
//!   the server with `KEYS`, never reads values in full
//! - **Topology-aware**: standalone servers (several DBs), clusters (every
//!   master scanned concurrently) and sentinel-managed masters
//! - **Partial results**: an unreachable node or an expired deadline costs
//!   only the affected shard, never the whole report
//! - **Pipelined**: metadata of a whole `SCAN` page travels in one round trip
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Sampler                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Topology    │───>│ Shard scan  │───>│ Metadata    │                  │
//! │  │ (shards)    │    │ (SCAN loop) │    │ Collector   │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │ SizeEstimator           │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │  Session    │    │           PrefixAggregator (per shard)        │   │
//! │  │ RESP client │    └──────────────────────┬───────────────────────┘   │
//! │  └─────────────┘                           ▼                            │
//! │                              Aggregate::merge ──> ScanReport            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use keyscope::{NodeAddr, Sampler, ScanConfig, TcpConnector, Topology};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScanConfig {
//!         sample_limit: 5_000,
//!         ..Default::default()
//!     };
//!     let sampler = Sampler::new(TcpConnector::default(), config);
//!     let topology = Topology::Standalone {
//!         node: NodeAddr::new("127.0.0.1", 6379),
//!     };
//!
//!     let report = sampler.sample(&topology).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP encoding, incremental reply parsing, typed reply decoding
//! - [`connection`]: sessions with store nodes and the connector that opens them
//! - [`sampler`]: shard scans, metadata collection and size estimation
//! - [`aggregate`]: prefix statistics, histograms, top-N lists and merging
//! - [`config`]: scan configuration and topology
//! - [`model`]: key metadata and the report
//!
//! ## Design Highlights
//!
//! ### Shard-local aggregation
//!
//! Every shard folds its own keys into a private aggregate. Partials are
//! merged once all shards are done, and the merge is associative and
//! commutative, so the report does not depend on which node answered first.
//!
//! ### Sampling bias
//!
//! Sizes are estimated for every `size_stride`-th key of each scanned batch
//! only. Prefix byte totals therefore undercount; `estimatedKeys` on each
//! prefix tells how many keys the total is based on.

pub mod aggregate;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod protocol;
pub mod sampler;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use config::{Credentials, NodeAddr, ScanConfig, Topology};
pub use connection::{Connector, Session, TcpConnector};
pub use error::{ClientError, ConfigError};
pub use model::{KeyMeta, KeyType, SampleStats, ScanReport, Shard};
pub use sampler::Sampler;

/// The default port of a store node
pub const DEFAULT_PORT: u16 = 6379;

/// The default host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Keyscope
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
