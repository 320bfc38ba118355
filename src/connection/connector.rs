//! TCP connector: opens authenticated, DB-selected sessions.

use crate::config::{Credentials, NodeAddr};
use crate::connection::client::{Connection, ConnectionStats};
use crate::connection::session::{Connector, Session};
use crate::error::ClientError;
use crate::protocol::{Command, ReplyError, RespValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens [`Connection`]s over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    credentials: Option<Credentials>,
    connect_timeout: Duration,
    stats: Arc<ConnectionStats>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TcpConnector {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Statistics over every session this connector opened.
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// AUTH and SELECT commands to run right after connecting.
    fn handshake(&self, db: u32) -> Vec<(&'static str, Command)> {
        let mut commands = Vec::new();
        if let Some(creds) = &self.credentials {
            let auth = match &creds.username {
                Some(user) => Command::new("AUTH").arg(user.clone()),
                None => Command::new("AUTH"),
            };
            commands.push(("AUTH", auth.arg(creds.password.clone())));
        }
        if db != 0 {
            commands.push(("SELECT", Command::new("SELECT").arg(db)));
        }
        commands
    }
}

impl Connector for TcpConnector {
    type Session = Connection<TcpStream>;

    async fn open(&self, node: &NodeAddr, db: u32) -> Result<Self::Session, ClientError> {
        let addr = node.to_string();
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((node.host.as_str(), node.port)),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout { addr: addr.clone() })??;
        stream.set_nodelay(true)?;

        let mut conn = Connection::new(stream, addr, Arc::clone(&self.stats));

        let handshake = self.handshake(db);
        if !handshake.is_empty() {
            let commands: Vec<Command> = handshake.iter().map(|(_, c)| c.clone()).collect();
            let replies = match conn.pipeline(&commands).await {
                Ok(replies) => replies,
                Err(e) => {
                    conn.close().await;
                    return Err(e);
                }
            };
            for (&(name, _), reply) in handshake.iter().zip(replies) {
                if let RespValue::Error(msg) = reply {
                    conn.close().await;
                    return Err(ClientError::reply(name, ReplyError::Server(msg)));
                }
            }
        }

        debug!(node = %node, db = db, "Session opened");
        Ok(conn)
    }
}
