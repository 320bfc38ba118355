//! RESP Protocol Implementation
//!
//! The client half of the Redis Serialization Protocol (RESP2): commands are
//! encoded as arrays of bulk strings, replies are parsed incrementally from
//! the socket buffer and then decoded into typed values.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply enum and the `Command` builder
//! - `parser`: incremental reply parser
//! - `reply`: typed decoding of individual replies
//!
//! ## Example
//!
//! ```
//! use keyscope::protocol::{parse_message, Command, RespValue};
//!
//! let bytes = Command::new("DBSIZE").encode();
//! assert_eq!(bytes, b"*1\r\n$6\r\nDBSIZE\r\n");
//!
//! let (reply, _) = parse_message(b":1024\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::Integer(1024));
//! ```

pub mod parser;
pub mod reply;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use reply::{ReplyError, Ttl};
pub use types::{Command, CommandArg, RespValue};
