//! Typed decoding of individual replies.
//!
//! A pipelined round trip yields one [`RespValue`] per sub-command. Each is
//! decoded here right away into a `Result<T, ReplyError>` so the rest of the
//! crate never inspects untyped reply shapes.

use crate::model::KeyType;
use crate::protocol::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// Why a single reply could not be turned into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The reply had a shape the command never produces.
    #[error("unexpected {found} reply to {command}")]
    Unexpected {
        command: &'static str,
        found: &'static str,
    },
}

impl ReplyError {
    /// True for "unknown command"/"unknown subcommand" errors, which mean the
    /// store does not offer the command at all (older versions, proxies).
    pub fn is_unknown_command(&self) -> bool {
        match self {
            ReplyError::Server(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("unknown command") || msg.contains("unknown subcommand")
            }
            ReplyError::Unexpected { .. } => false,
        }
    }
}

/// Remaining time to live as reported by `PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// `-2`: the key does not exist (anymore).
    Missing,
    /// `-1`: the key has no expiry.
    Persistent,
    /// Milliseconds until expiry.
    Millis(u64),
}

fn reject(value: &RespValue, command: &'static str) -> ReplyError {
    match value {
        RespValue::Error(msg) => ReplyError::Server(msg.clone()),
        other => ReplyError::Unexpected {
            command,
            found: other.kind(),
        },
    }
}

/// Decodes a `TYPE` reply. `Ok(None)` means the key is gone.
pub fn decode_type(value: &RespValue) -> Result<Option<KeyType>, ReplyError> {
    match value {
        RespValue::SimpleString(_) | RespValue::BulkString(_) => match value.as_str() {
            Some("none") => Ok(None),
            Some(name) => Ok(Some(KeyType::from_type_reply(name))),
            None => Err(reject(value, "TYPE")),
        },
        other => Err(reject(other, "TYPE")),
    }
}

/// Decodes a `PTTL` reply.
pub fn decode_ttl(value: &RespValue) -> Result<Ttl, ReplyError> {
    match value.as_integer() {
        Some(-2) => Ok(Ttl::Missing),
        Some(-1) => Ok(Ttl::Persistent),
        Some(ms) if ms >= 0 => Ok(Ttl::Millis(ms as u64)),
        _ => Err(reject(value, "PTTL")),
    }
}

/// Decodes a non-negative integer reply (`OBJECT IDLETIME`, `DBSIZE`, `*LEN`, ...).
pub fn decode_count(value: &RespValue, command: &'static str) -> Result<u64, ReplyError> {
    match value.as_integer() {
        Some(n) if n >= 0 => Ok(n as u64),
        _ => Err(reject(value, command)),
    }
}

/// Decodes a `MEMORY USAGE` reply. `Ok(None)` covers the null reply for a
/// missing key and non-positive values.
pub fn decode_memory_usage(value: &RespValue) -> Result<Option<u64>, ReplyError> {
    match value {
        RespValue::Null => Ok(None),
        _ => match value.as_integer() {
            Some(n) if n > 0 => Ok(Some(n as u64)),
            Some(_) => Ok(None),
            None => Err(reject(value, "MEMORY USAGE")),
        },
    }
}

/// Decodes a flat array of bulk strings (`LRANGE`, `ZRANGE ... WITHSCORES`).
pub fn decode_bulk_list(value: &RespValue, command: &'static str) -> Result<Vec<Bytes>, ReplyError> {
    let items = value.as_array().ok_or_else(|| reject(value, command))?;
    items
        .iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b.clone()),
            RespValue::SimpleString(s) => Ok(Bytes::from(s.clone())),
            RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
            other => Err(reject(other, command)),
        })
        .collect()
}

/// Decodes a cursor reply (`SCAN`, `HSCAN`, `SSCAN`): `[cursor, [items...]]`.
pub fn decode_cursor_page(
    value: &RespValue,
    command: &'static str,
) -> Result<(Bytes, Vec<Bytes>), ReplyError> {
    match value.as_array() {
        Some([cursor, items]) => {
            let cursor = match cursor {
                RespValue::BulkString(b) => b.clone(),
                RespValue::SimpleString(s) => Bytes::from(s.clone()),
                RespValue::Integer(n) => Bytes::from(n.to_string()),
                other => return Err(reject(other, command)),
            };
            Ok((cursor, decode_bulk_list(items, command)?))
        }
        _ => Err(reject(value, command)),
    }
}
