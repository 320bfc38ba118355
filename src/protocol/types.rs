//! RESP (Redis Serialization Protocol) Data Types
//!
//! This module defines the reply values a store sends back and the
//! [`Command`] type the sampler sends out.
//!
//! ## Protocol Format
//!
//! Each RESP reply starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All types are terminated with CRLF (`\r\n`).
//!
//! Commands always travel as an array of bulk strings:
//! `*2\r\n$4\r\nTYPE\r\n$8\r\nuser:101\r\n`

use bytes::Bytes;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply value in the RESP protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply such as `+OK` or `+string` (the TYPE reply).
    SimpleString(String),

    /// Error reply. The first word is the error kind (`ERR`, `WRONGTYPE`, ...).
    Error(String),

    /// 64-bit signed integer reply.
    Integer(i64),

    /// Binary-safe bulk string.
    BulkString(Bytes),

    /// Null bulk string or null array.
    Null,

    /// Array reply, possibly nested (SCAN returns `[cursor, [keys...]]`).
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string reply.
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error reply.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new integer reply.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string reply.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates an array reply.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    ///
    /// Bulk strings holding a decimal number are accepted too, since some
    /// proxies answer integer commands that way.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics that must not echo payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
        }
    }
}

/// A command sent to the store: a name followed by binary-safe arguments.
///
/// # Example
/// ```
/// use keyscope::protocol::Command;
/// let scan = Command::new("SCAN").arg("0").arg("COUNT").arg(500u64);
/// assert_eq!(scan.name(), "SCAN");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command with its name.
    pub fn new(name: &'static str) -> Self {
        Self {
            args: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl CommandArg) -> Self {
        self.args.push(arg.into_arg());
        self
    }

    /// The command name (first argument).
    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.args[0]).unwrap_or("")
    }

    /// All arguments including the name.
    #[cfg(test)]
    pub(crate) fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Serializes the command as a RESP array of bulk strings into `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(prefix::ARRAY);
        buf.extend_from_slice(self.args.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        for arg in &self.args {
            buf.push(prefix::BULK_STRING);
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(arg);
            buf.extend_from_slice(CRLF);
        }
    }

    /// Serializes the command into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }
}

/// Values that can be used as command arguments.
pub trait CommandArg {
    fn into_arg(self) -> Bytes;
}

impl CommandArg for Bytes {
    fn into_arg(self) -> Bytes {
        self
    }
}

impl CommandArg for &Bytes {
    fn into_arg(self) -> Bytes {
        self.clone()
    }
}

impl CommandArg for &'static str {
    fn into_arg(self) -> Bytes {
        Bytes::from_static(self.as_bytes())
    }
}

impl CommandArg for String {
    fn into_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

impl CommandArg for u64 {
    fn into_arg(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl CommandArg for u32 {
    fn into_arg(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl CommandArg for usize {
    fn into_arg(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}
