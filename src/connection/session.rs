//! The seams between the sampler and the network.
//!
//! A [`Session`] is one open conversation with one node, already
//! authenticated and pointed at the right database. A [`Connector`] opens
//! sessions. The sampler owns every session it opens and closes it when the
//! shard is done; nothing is cached between calls.

use crate::config::NodeAddr;
use crate::error::ClientError;
use crate::protocol::{Command, RespValue};
use std::future::Future;

/// An open session with one store node.
pub trait Session: Send {
    /// Sends all `commands` in one round trip and returns one reply per
    /// command, in order. Error replies are returned as
    /// [`RespValue::Error`], not as `Err`; `Err` means the session itself
    /// failed and must not be used further.
    fn pipeline(
        &mut self,
        commands: &[Command],
    ) -> impl Future<Output = Result<Vec<RespValue>, ClientError>> + Send;

    /// Sends a single command.
    fn query(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<RespValue, ClientError>> + Send {
        async move {
            let mut replies = self.pipeline(std::slice::from_ref(&command)).await?;
            replies.pop().ok_or(ClientError::ConnectionClosed)
        }
    }

    /// Ends the session. Best effort; never fails.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Opens sessions to store nodes.
pub trait Connector: Sync {
    type Session: Session;

    /// Opens a session to `node` with database `db` selected.
    fn open(
        &self,
        node: &NodeAddr,
        db: u32,
    ) -> impl Future<Output = Result<Self::Session, ClientError>> + Send;
}
