//! Per-key memory estimation.
//!
//! `MEMORY USAGE` answers in O(1) on modern servers and is preferred. When it
//! is missing or fails, a type-specific heuristic looks at the cardinality
//! and a handful of elements; values are never read in full. A key whose size
//! cannot be told gets `None`, never a zero; only a broken session is an
//! error.

use crate::connection::Session;
use crate::error::ClientError;
use crate::model::KeyType;
use crate::protocol::reply::{
    decode_bulk_list, decode_count, decode_cursor_page, decode_memory_usage,
};
use crate::protocol::{Command, RespValue};
use bytes::Bytes;
use tracing::debug;

/// Bookkeeping bytes added to every heuristic estimate (dict entry, key
/// object, expiry slot).
pub const KEY_OVERHEAD_BYTES: u64 = 56;

/// Assumed size of one stream entry.
pub const STREAM_ENTRY_BYTES: u64 = 100;

/// Assumed size of a key of an unrecognized (module) type.
pub const UNKNOWN_TYPE_BYTES: u64 = 64;

/// Elements sampled from hashes, lists and sorted sets.
pub const COLLECTION_SAMPLE: usize = 10;

/// Members sampled from sets.
pub const SET_SAMPLE: usize = 20;

/// Encoded size of a sorted-set score.
const SCORE_BYTES: u64 = 8;

/// How the sampled reply is laid out.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// One item per element.
    Members,
    /// `field, value` pairs; an element is both.
    FieldValues,
    /// `member, score` pairs; an element is the member plus a double.
    MemberScores,
}

/// Estimates key sizes for one shard.
///
/// The estimator remembers when a node does not know `MEMORY USAGE` and stops
/// asking it, so a shard pays for the unknown-command reply only once.
#[derive(Debug, Clone)]
pub struct SizeEstimator {
    native: bool,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self { native: true }
    }

    /// Best-effort size of `key` in bytes.
    ///
    /// Error replies and malformed answers yield `Ok(None)`. An `Err` means
    /// the session itself failed and the shard must stop using it.
    pub async fn estimate<S: Session>(
        &mut self,
        session: &mut S,
        key: &Bytes,
        key_type: KeyType,
    ) -> Result<Option<u64>, ClientError> {
        if self.native {
            let reply = session
                .query(Command::new("MEMORY").arg("USAGE").arg(key))
                .await?;
            match decode_memory_usage(&reply) {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(e) if e.is_unknown_command() => {
                    debug!(error = %e, "MEMORY USAGE unavailable, using heuristics");
                    self.native = false;
                }
                Err(e) => debug!(error = %e, "MEMORY USAGE failed, using heuristics"),
            }
        }

        match heuristic(session, key, key_type).await {
            Ok(estimate) => Ok(estimate.map(|bytes| bytes + KEY_OVERHEAD_BYTES)),
            Err(e @ ClientError::Reply { .. }) => {
                debug!(key_type = %key_type, error = %e, "Heuristic size estimate failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Heuristic payload size. `Ok(None)` means the key vanished.
async fn heuristic<S: Session>(
    session: &mut S,
    key: &Bytes,
    key_type: KeyType,
) -> Result<Option<u64>, ClientError> {
    match key_type {
        KeyType::String | KeyType::Bitmap => {
            let reply = session.query(Command::new("STRLEN").arg(key)).await?;
            count(&reply, "STRLEN").map(Some)
        }
        KeyType::Hash => {
            extrapolate(
                session,
                ("HLEN", Command::new("HLEN").arg(key)),
                (
                    "HSCAN",
                    Command::new("HSCAN")
                        .arg(key)
                        .arg("0")
                        .arg("COUNT")
                        .arg(COLLECTION_SAMPLE),
                ),
                Layout::FieldValues,
                COLLECTION_SAMPLE,
            )
            .await
        }
        KeyType::List => {
            extrapolate(
                session,
                ("LLEN", Command::new("LLEN").arg(key)),
                (
                    "LRANGE",
                    Command::new("LRANGE")
                        .arg(key)
                        .arg("0")
                        .arg(COLLECTION_SAMPLE - 1),
                ),
                Layout::Members,
                COLLECTION_SAMPLE,
            )
            .await
        }
        KeyType::Zset => {
            extrapolate(
                session,
                ("ZCARD", Command::new("ZCARD").arg(key)),
                (
                    "ZRANGE",
                    Command::new("ZRANGE")
                        .arg(key)
                        .arg("0")
                        .arg(COLLECTION_SAMPLE - 1)
                        .arg("WITHSCORES"),
                ),
                Layout::MemberScores,
                COLLECTION_SAMPLE,
            )
            .await
        }
        KeyType::Set => {
            extrapolate(
                session,
                ("SCARD", Command::new("SCARD").arg(key)),
                (
                    "SSCAN",
                    Command::new("SSCAN")
                        .arg(key)
                        .arg("0")
                        .arg("COUNT")
                        .arg(SET_SAMPLE),
                ),
                Layout::Members,
                SET_SAMPLE,
            )
            .await
        }
        KeyType::Stream => {
            let reply = session.query(Command::new("XLEN").arg(key)).await?;
            Ok(Some(count(&reply, "XLEN")? * STREAM_ENTRY_BYTES))
        }
        KeyType::Other => Ok(Some(UNKNOWN_TYPE_BYTES)),
    }
}

fn count(reply: &RespValue, command: &'static str) -> Result<u64, ClientError> {
    decode_count(reply, command).map_err(|e| ClientError::reply(command, e))
}

/// Cardinality times the average sampled element size, in one round trip.
async fn extrapolate<S: Session>(
    session: &mut S,
    (len_name, len_cmd): (&'static str, Command),
    (sample_name, sample_cmd): (&'static str, Command),
    layout: Layout,
    limit: usize,
) -> Result<Option<u64>, ClientError> {
    let replies = session.pipeline(&[len_cmd, sample_cmd]).await?;
    let [len_reply, sample_reply] = <[RespValue; 2]>::try_from(replies)
        .map_err(|r| ClientError::ReplyCount {
            expected: 2,
            got: r.len(),
        })?;

    let cardinality = count(&len_reply, len_name)?;
    if cardinality == 0 {
        return Ok(None);
    }

    let items = if sample_name.ends_with("SCAN") {
        decode_cursor_page(&sample_reply, sample_name).map(|(_, page)| page)
    } else {
        decode_bulk_list(&sample_reply, sample_name)
    }
    .map_err(|e| ClientError::reply(sample_name, e))?;

    let sizes: Vec<u64> = match layout {
        Layout::Members => items.iter().take(limit).map(|m| m.len() as u64).collect(),
        Layout::FieldValues => items
            .chunks_exact(2)
            .take(limit)
            .map(|pair| (pair[0].len() + pair[1].len()) as u64)
            .collect(),
        Layout::MemberScores => items
            .chunks_exact(2)
            .take(limit)
            .map(|pair| pair[0].len() as u64 + SCORE_BYTES)
            .collect(),
    };

    // A SCAN-family page may legitimately come back empty on a large
    // collection; without a sample there is nothing to extrapolate from.
    if sizes.is_empty() {
        return Ok(None);
    }

    let total: u128 = sizes.iter().map(|&s| s as u128).sum();
    let estimate = total * cardinality as u128 / sizes.len() as u128;
    Ok(Some(u64::try_from(estimate).unwrap_or(u64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeKey, FakeStore};

    async fn estimate_one(store: FakeStore, key: &str, key_type: KeyType) -> Option<u64> {
        let store = store.shared();
        let mut session = store.session(0);
        SizeEstimator::new()
            .estimate(&mut session, &Bytes::from(key.to_string()), key_type)
            .await
            .unwrap()
    }

    fn heuristic_store(key: &str, value: FakeKey) -> FakeStore {
        let mut store = FakeStore::new().without_memory_usage();
        store.insert(0, key, value);
        store
    }

    #[tokio::test]
    async fn test_native_memory_usage() {
        let mut store = FakeStore::new();
        store.insert(0, "k", FakeKey::string("hello").with_memory(72));
        assert_eq!(estimate_one(store, "k", KeyType::String).await, Some(72));
    }

    #[tokio::test]
    async fn test_string_heuristic() {
        let store = heuristic_store("k", FakeKey::string("hello"));
        assert_eq!(
            estimate_one(store, "k", KeyType::String).await,
            Some(5 + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_list_heuristic() {
        let store = heuristic_store("l", FakeKey::list(&["aa", "bbb", "c"]));
        // avg 2 bytes * 3 elements
        assert_eq!(
            estimate_one(store, "l", KeyType::List).await,
            Some(6 + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_list_heuristic_extrapolates_beyond_sample() {
        let items: Vec<String> = (0..100).map(|_| "xxxx".to_string()).collect();
        let items: Vec<&str> = items.iter().map(String::as_str).collect();
        let store = heuristic_store("l", FakeKey::list(&items));
        assert_eq!(
            estimate_one(store, "l", KeyType::List).await,
            Some(400 + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_hash_heuristic() {
        let store = heuristic_store("h", FakeKey::hash(&[("f1", "v1"), ("field2", "v2")]));
        // (4 + 8) / 2 = 6 per field, 2 fields
        assert_eq!(
            estimate_one(store, "h", KeyType::Hash).await,
            Some(12 + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_zset_heuristic() {
        let store = heuristic_store("z", FakeKey::zset(&[("ab", 1.0), ("abcd", 2.5)]));
        // members 2 and 4 bytes plus a score each
        assert_eq!(
            estimate_one(store, "z", KeyType::Zset).await,
            Some(6 + 2 * SCORE_BYTES + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_set_heuristic() {
        let store = heuristic_store("s", FakeKey::set(&["one", "two", "three"]));
        // 11 bytes over 3 members
        assert_eq!(
            estimate_one(store, "s", KeyType::Set).await,
            Some(11 + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_stream_and_other() {
        let store = heuristic_store("x", FakeKey::stream(4));
        assert_eq!(
            estimate_one(store, "x", KeyType::Stream).await,
            Some(4 * STREAM_ENTRY_BYTES + KEY_OVERHEAD_BYTES)
        );

        let store = heuristic_store("m", FakeKey::module("MBbloom--"));
        assert_eq!(
            estimate_one(store, "m", KeyType::Other).await,
            Some(UNKNOWN_TYPE_BYTES + KEY_OVERHEAD_BYTES)
        );
    }

    #[tokio::test]
    async fn test_failure_is_absence() {
        let store = heuristic_store("k", FakeKey::string("hello").broken_size());
        assert_eq!(estimate_one(store, "k", KeyType::String).await, None);

        let mut store = FakeStore::new();
        store.insert(0, "k", FakeKey::string("hello").broken_size());
        assert_eq!(estimate_one(store, "k", KeyType::String).await, None);
    }

    #[tokio::test]
    async fn test_vanished_collection_is_absence() {
        let store = FakeStore::new().without_memory_usage();
        assert_eq!(estimate_one(store, "gone", KeyType::Hash).await, None);
    }

    #[tokio::test]
    async fn test_stops_asking_for_memory_usage() {
        let mut store = FakeStore::new().without_memory_usage();
        store.insert(0, "a", FakeKey::string("x"));
        store.insert(0, "b", FakeKey::string("yy"));
        let store = store.shared();
        let mut session = store.session(0);

        let mut estimator = SizeEstimator::new();
        assert_eq!(
            estimator
                .estimate(&mut session, &Bytes::from("a"), KeyType::String)
                .await
                .unwrap(),
            Some(1 + KEY_OVERHEAD_BYTES)
        );
        assert!(!estimator.native);
        assert_eq!(
            estimator
                .estimate(&mut session, &Bytes::from("b"), KeyType::String)
                .await
                .unwrap(),
            Some(2 + KEY_OVERHEAD_BYTES)
        );
        assert_eq!(store.calls("MEMORY"), 1);
    }

    #[tokio::test]
    async fn test_broken_session_is_an_error() {
        let mut store = FakeStore::new().break_on("MEMORY");
        store.insert(0, "k", FakeKey::string("hello"));
        let store = store.shared();
        let mut session = store.session(0);
        let result = SizeEstimator::new()
            .estimate(&mut session, &Bytes::from("k"), KeyType::String)
            .await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));

        let mut store = FakeStore::new().without_memory_usage().break_on("HLEN");
        store.insert(0, "h", FakeKey::hash(&[("f", "v")]));
        let store = store.shared();
        let mut session = store.session(0);
        let result = SizeEstimator::new()
            .estimate(&mut session, &Bytes::from("h"), KeyType::Hash)
            .await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
}
