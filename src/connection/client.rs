//! Client Connection
//!
//! One [`Connection`] wraps one socket to one store node. It writes a whole
//! pipeline of commands in a single write, then reads replies until it has
//! one per command.
//!
//! ## Round Trip
//!
//! ```text
//! 1. Encode every command into one buffer
//!        │
//!        ▼
//! 2. write_all + flush
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  Until N replies parsed:     │
//!    │    parse from buffer         │
//!    │    else read more bytes      │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Return replies in command order
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: one read may hold half a reply or many replies.
//! A BytesMut buffer accumulates bytes and the parser consumes complete
//! replies from its front.

use crate::connection::session::Session;
use crate::error::ClientError;
use crate::protocol::{Command, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Maximum bytes buffered while waiting for one reply to complete (64 MB)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 16 * 1024;

/// Statistics shared by every connection a connector opens.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total sessions opened
    pub sessions_opened: AtomicU64,
    /// Sessions currently open
    pub active_sessions: AtomicU64,
    /// Pipelined round trips completed
    pub round_trips: AtomicU64,
    /// Commands sent
    pub commands_sent: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn round_trip(&self, commands: usize) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.commands_sent
            .fetch_add(commands as u64, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// A client connection to one node.
pub struct Connection<S> {
    /// The underlying stream (a TcpStream in production)
    stream: S,

    /// Node address (for logging)
    addr: String,

    /// Buffer for incoming reply bytes
    buffer: BytesMut,

    /// RESP reply parser
    parser: RespParser,

    /// Shared statistics
    stats: Arc<ConnectionStats>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-connected stream.
    pub fn new(stream: S, addr: impl Into<String>, stats: Arc<ConnectionStats>) -> Self {
        stats.session_opened();

        Self {
            stream,
            addr: addr.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            stats,
        }
    }

    /// Writes all commands at once and reads back one reply per command.
    pub async fn send_pipeline(
        &mut self,
        commands: &[Command],
    ) -> Result<Vec<RespValue>, ClientError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(64 * commands.len());
        for command in commands {
            command.encode_into(&mut out);
        }
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(out.len());

        let mut replies = Vec::with_capacity(commands.len());
        while replies.len() < commands.len() {
            replies.push(self.read_reply().await?);
        }

        self.stats.round_trip(commands.len());
        trace!(
            node = %self.addr,
            commands = commands.len(),
            bytes = out.len(),
            "Round trip complete"
        );
        Ok(replies)
    }

    /// Reads one complete reply, pulling from the socket as needed.
    async fn read_reply(&mut self) -> Result<RespValue, ClientError> {
        loop {
            if let Some(reply) = self.try_parse_reply()? {
                return Ok(reply);
            }
            self.read_more_data().await?;
        }
    }

    /// Attempts to parse a reply from the buffer.
    fn try_parse_reply(&mut self) -> Result<Option<RespValue>, ClientError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(
                    node = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete reply, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(node = %self.addr, error = %e, "Reply parse error");
                Err(ClientError::Parse(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ClientError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                node = %self.addr,
                size = self.buffer.len(),
                "Reply buffer limit exceeded"
            );
            return Err(ClientError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        self.stats.bytes_read(n);
        Ok(())
    }

    /// Sends QUIT and shuts the stream down, ignoring failures.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.send_pipeline(&[Command::new("QUIT")]).await {
            debug!(node = %self.addr, error = %e, "QUIT failed");
        }
        let _ = self.stream.shutdown().await;
        self.stats.session_closed();
        debug!(node = %self.addr, "Session closed");
    }
}

impl<S> Session for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<RespValue>, ClientError> {
        self.send_pipeline(commands).await
    }

    async fn close(self) {
        self.shutdown().await
    }
}
