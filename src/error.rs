//! Error types.
//!
//! Two classes exist. [`ClientError`] covers everything that can go wrong
//! talking to one store node; the sampler recovers from it per shard and
//! reports it as a diagnostic string. [`ConfigError`] is fatal: it is raised
//! before any I/O and aborts the whole sampling call.

use crate::protocol::{ParseError, ReplyError};
use thiserror::Error;

/// Errors raised by a session with one store node.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reply stream could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A command got an error or malformed reply
    #[error("{command} failed: {source}")]
    Reply {
        command: &'static str,
        #[source]
        source: ReplyError,
    },

    /// The server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A pipeline came back with the wrong number of replies
    #[error("expected {expected} replies, got {got}")]
    ReplyCount { expected: usize, got: usize },

    /// TCP connect did not complete in time
    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: String },

    /// A single reply outgrew the read buffer limit
    #[error("reply buffer limit exceeded")]
    BufferFull,
}

impl ClientError {
    pub fn reply(command: &'static str, source: ReplyError) -> Self {
        ClientError::Reply { command, source }
    }
}

/// Invalid configuration or topology. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cluster topology requires at least one node")]
    EmptyNodeList,

    #[error("sentinel topology requires at least one sentinel")]
    EmptySentinelList,

    #[error("sentinel topology requires a master name")]
    MissingMasterName,

    #[error("at least one database index is required")]
    EmptyDbList,

    #[error("database {0} is listed more than once")]
    DuplicateDb(u32),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    #[error("{name} buckets are invalid: {reason}")]
    InvalidBuckets {
        name: &'static str,
        reason: &'static str,
    },

    #[error("invalid node address {0:?}, expected host:port")]
    InvalidAddress(String),
}
