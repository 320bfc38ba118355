//! Connection Module
//!
//! Sessions with store nodes. The sampler never holds a global client: a
//! [`Connector`] opens one [`Session`] per shard, the shard's scan owns it,
//! and the scan closes it when done.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Sampler                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ open(node, db)
//!                        ▼
//!           ┌────────────────────────┐
//!           │     TcpConnector       │  connect, AUTH, SELECT
//!           └────────────┬───────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Connection                               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Encode N    │───>│ One write   │───>│ Parse N     │     │
//! │  │ commands    │    │             │    │ replies     │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use keyscope::connection::{Connector, Session, TcpConnector};
//! use keyscope::config::NodeAddr;
//! use keyscope::protocol::Command;
//!
//! let connector = TcpConnector::default();
//! let mut session = connector.open(&NodeAddr::new("127.0.0.1", 6379), 0).await?;
//! let size = session.query(Command::new("DBSIZE")).await?;
//! session.close().await;
//! ```

pub mod client;
pub mod connector;
pub mod session;

// Re-export commonly used types
pub use client::{Connection, ConnectionStats};
pub use connector::{TcpConnector, DEFAULT_CONNECT_TIMEOUT};
pub use session::{Connector, Session};
