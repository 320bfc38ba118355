//! Batch metadata collection.

use crate::connection::Session;
use crate::error::ClientError;
use crate::model::{KeyMeta, Shard};
use crate::protocol::reply::{decode_count, decode_ttl, decode_type, Ttl};
use crate::protocol::{Command, RespValue};
use crate::sampler::driver::{within, ShardError};
use crate::sampler::estimator::SizeEstimator;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Commands sent per key: `TYPE`, `PTTL`, `OBJECT IDLETIME`.
const COMMANDS_PER_KEY: usize = 3;

/// What one batch produced.
#[derive(Debug, Default)]
pub struct CollectedBatch {
    /// Surviving keys, in scan order.
    pub keys: Vec<KeyMeta>,
    /// Size estimations attempted.
    pub size_calls: u64,
    /// Set when the deadline passed or the session broke while sizes were
    /// being estimated. `keys` is still complete; later keys carry no
    /// estimate.
    pub stopped: Option<ShardError>,
}

/// Turns a batch of key names into [`KeyMeta`].
///
/// Type, expiry and idle time of the whole batch travel in a single
/// pipelined round trip. Keys that vanished between `SCAN` and the lookup
/// are dropped silently. Every `size_stride`-th key of the batch (by its
/// position in the scanned batch, dropped keys included) also gets a size
/// estimate.
#[derive(Debug)]
pub struct MetadataCollector {
    size_stride: usize,
    estimator: SizeEstimator,
}

impl MetadataCollector {
    pub fn new(size_stride: usize) -> Self {
        Self {
            size_stride: size_stride.max(1),
            estimator: SizeEstimator::new(),
        }
    }

    /// Collects metadata for `keys`.
    ///
    /// An `Err` means the metadata round trip itself failed or ran past
    /// `deadline`, so nothing of the batch is known. No single-key failure
    /// ever surfaces here.
    pub async fn collect<S: Session>(
        &mut self,
        session: &mut S,
        keys: &[Bytes],
        shard: &Shard,
        deadline: Option<Instant>,
    ) -> Result<CollectedBatch, ShardError> {
        let mut batch = CollectedBatch::default();
        if keys.is_empty() {
            return Ok(batch);
        }

        let commands: Vec<Command> = keys
            .iter()
            .flat_map(|key| {
                [
                    Command::new("TYPE").arg(key),
                    Command::new("PTTL").arg(key),
                    Command::new("OBJECT").arg("IDLETIME").arg(key),
                ]
            })
            .collect();
        let replies = within(deadline, session.pipeline(&commands)).await?;
        if replies.len() != commands.len() {
            return Err(ClientError::ReplyCount {
                expected: commands.len(),
                got: replies.len(),
            }
            .into());
        }

        batch.keys.reserve(keys.len());
        for (index, (key, replies)) in keys
            .iter()
            .zip(replies.chunks_exact(COMMANDS_PER_KEY))
            .enumerate()
        {
            let Some(mut meta) = decode_key(key, replies, shard) else {
                continue;
            };
            if batch.stopped.is_none() && index % self.size_stride == 0 {
                batch.size_calls += 1;
                let estimate = self.estimator.estimate(session, key, meta.key_type);
                match within(deadline, estimate).await {
                    Ok(bytes) => meta.est_bytes = bytes,
                    Err(e) => {
                        debug!(shard = %shard, error = %e, "Size estimation stopped");
                        batch.stopped = Some(e);
                    }
                }
            }
            batch.keys.push(meta);
        }

        Ok(batch)
    }
}

/// Builds the metadata of one key from its `TYPE`, `PTTL` and
/// `OBJECT IDLETIME` replies, or `None` if the key is gone or unreadable.
fn decode_key(key: &Bytes, replies: &[RespValue], shard: &Shard) -> Option<KeyMeta> {
    let [type_reply, ttl_reply, idle_reply] = replies else {
        return None;
    };

    let key_type = match decode_type(type_reply) {
        Ok(Some(key_type)) => key_type,
        Ok(None) => return None,
        Err(e) => {
            trace!(error = %e, "Dropping key with unreadable type");
            return None;
        }
    };

    let ttl_ms = match decode_ttl(ttl_reply) {
        Ok(Ttl::Persistent) => None,
        Ok(Ttl::Millis(ms)) => Some(ms),
        Ok(Ttl::Missing) => return None,
        Err(e) => {
            trace!(error = %e, "Dropping key with unreadable TTL");
            return None;
        }
    };

    // Idle time is not tracked under LFU eviction policies.
    let idle_sec = decode_count(idle_reply, "OBJECT IDLETIME").ok();

    Some(KeyMeta {
        key: String::from_utf8_lossy(key).into_owned(),
        key_type,
        ttl_ms,
        idle_sec,
        est_bytes: None,
        shard: shard.clone(),
    })
}
