//! Cursor-driven scan of one shard.

use crate::config::{NodeAddr, ScanConfig};
use crate::connection::{Connector, Session};
use crate::error::ClientError;
use crate::model::{KeyMeta, Shard};
use crate::protocol::reply::{decode_count, decode_cursor_page};
use crate::protocol::Command;
use crate::sampler::collector::MetadataCollector;
use bytes::Bytes;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Upper bound on the polite `QUIT` at the end of a shard. A node that
/// stopped answering is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a shard scan stopped early.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("deadline exceeded")]
    Deadline,
}

/// Everything one shard produced. Keys gathered before a failure are kept.
#[derive(Debug)]
pub struct ShardScan {
    pub shard: Shard,
    pub keys: Vec<KeyMeta>,
    /// `DBSIZE` of the shard, 0 if it could not be read.
    pub approx_keys: u64,
    pub size_calls: u64,
    /// One diagnostic line if the scan stopped early.
    pub error: Option<String>,
}

impl ShardScan {
    fn new(shard: Shard) -> Self {
        Self {
            shard,
            keys: Vec::new(),
            approx_keys: 0,
            size_calls: 0,
            error: None,
        }
    }

    fn fail(&mut self, error: ShardError) {
        warn!(
            shard = %self.shard,
            error = %error,
            collected = self.keys.len(),
            "Shard scan stopped early"
        );
        self.error = Some(match error {
            ShardError::Deadline => format!(
                "{}: deadline exceeded after {} keys",
                self.shard,
                self.keys.len()
            ),
            ShardError::Client(e) => format!("{}: {}", self.shard, e),
        });
    }
}

/// Awaits `fut`, giving up at `deadline`.
pub(crate) async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, ShardError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ShardError::Deadline)?
            .map_err(ShardError::from),
        None => fut.await.map_err(ShardError::from),
    }
}

/// Scans one shard until the cursor wraps, `budget` keys are collected, or
/// the deadline passes. Never fails: errors end up in [`ShardScan::error`].
pub(crate) async fn scan_shard<C: Connector>(
    connector: &C,
    config: &ScanConfig,
    node: &NodeAddr,
    db: u32,
    shard: Shard,
    budget: usize,
    deadline: Option<Instant>,
) -> ShardScan {
    let mut scan = ShardScan::new(shard);
    debug!(shard = %scan.shard, node = %node, budget, "Scanning shard");

    let mut session = match within(deadline, connector.open(node, db)).await {
        Ok(session) => session,
        Err(e) => {
            scan.fail(e);
            return scan;
        }
    };

    if let Err(e) = drive(&mut session, config, budget, deadline, &mut scan).await {
        scan.fail(e);
    }

    close(session).await;

    debug!(
        shard = %scan.shard,
        keys = scan.keys.len(),
        approx_keys = scan.approx_keys,
        "Shard done"
    );
    scan
}

/// Ends a session, dropping it instead if the node does not answer `QUIT`.
pub(crate) async fn close<S: Session>(session: S) {
    if tokio::time::timeout(CLOSE_TIMEOUT, session.close())
        .await
        .is_err()
    {
        trace!("Close timed out, dropping session");
    }
}

async fn drive<S: Session>(
    session: &mut S,
    config: &ScanConfig,
    budget: usize,
    deadline: Option<Instant>,
    scan: &mut ShardScan,
) -> Result<(), ShardError> {
    let reply = within(deadline, session.query(Command::new("DBSIZE"))).await?;
    scan.approx_keys =
        decode_count(&reply, "DBSIZE").map_err(|e| ClientError::reply("DBSIZE", e))?;

    let mut collector = MetadataCollector::new(config.size_stride);
    // SCAN may return a key more than once; each key is collected once.
    let mut seen: HashSet<Bytes> = HashSet::new();
    let mut cursor = Bytes::from_static(b"0");

    while scan.keys.len() < budget {
        let mut command = Command::new("SCAN").arg(&cursor);
        if let Some(pattern) = &config.match_pattern {
            command = command.arg("MATCH").arg(pattern.clone());
        }
        command = command.arg("COUNT").arg(config.scan_count);

        let reply = within(deadline, session.query(command)).await?;
        let (next, page) =
            decode_cursor_page(&reply, "SCAN").map_err(|e| ClientError::reply("SCAN", e))?;

        let remaining = budget - scan.keys.len();
        let fresh: Vec<Bytes> = page
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .take(remaining)
            .collect();
        trace!(shard = %scan.shard, page = fresh.len(), "SCAN page");

        if !fresh.is_empty() {
            let batch = collector
                .collect(session, &fresh, &scan.shard, deadline)
                .await?;
            scan.size_calls += batch.size_calls;
            scan.keys.extend(batch.keys);
            if let Some(e) = batch.stopped {
                return Err(e);
            }
        }

        if next.as_ref() == b"0" {
            break;
        }
        cursor = next;
    }

    Ok(())
}

/// Cuts the combined sample down to `limit` keys, taking one key from each
/// shard in turn so that no shard is favored by the order it finished in.
pub(crate) fn truncate_round_robin(shards: &mut [Vec<KeyMeta>], limit: usize) {
    let total: usize = shards.iter().map(Vec::len).sum();
    if total <= limit {
        return;
    }

    let mut quotas = vec![0usize; shards.len()];
    let mut left = limit;
    while left > 0 {
        for (quota, keys) in quotas.iter_mut().zip(shards.iter()) {
            if left == 0 {
                break;
            }
            if *quota < keys.len() {
                *quota += 1;
                left -= 1;
            }
        }
    }

    for (keys, quota) in shards.iter_mut().zip(quotas) {
        keys.truncate(quota);
    }
}
