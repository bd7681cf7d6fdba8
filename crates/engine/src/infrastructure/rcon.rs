//! RCON client for the voxel-world server.
//!
//! Wire format, all integers little-endian:
//!
//! ```text
//! | length: i32 | request id: i32 | type: i32 | body: utf-8 | 0x00 | 0x00 |
//! ```
//!
//! `length` counts everything after itself. A login is type 3 and the server
//! answers with the request id, or -1 when the password is wrong. Commands
//! are type 2 and answered with a type 0 packet carrying the same id.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::infrastructure::ports::{CommandConnection, CommandConnector, CommandError};

pub const PACKET_LOGIN: i32 = 3;
pub const PACKET_COMMAND: i32 = 2;
pub const PACKET_RESPONSE: i32 = 0;

/// Longest command body the server accepts.
pub const MAX_COMMAND_LEN: usize = 1446;

/// Upper bound on a response length, to reject garbage before allocating.
const MAX_RESPONSE_LEN: i32 = 1 << 20;

/// id + type + two terminating nul bytes.
const HEADER_AND_PADDING: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

/// Frame one packet.
pub fn encode_packet(id: i32, kind: i32, body: &str) -> Vec<u8> {
    let length = body.len() as i32 + HEADER_AND_PADDING;
    let mut buffer = Vec::with_capacity(body.len() + 14);
    buffer.extend_from_slice(&length.to_le_bytes());
    buffer.extend_from_slice(&id.to_le_bytes());
    buffer.extend_from_slice(&kind.to_le_bytes());
    buffer.extend_from_slice(body.as_bytes());
    buffer.extend_from_slice(&[0, 0]);
    buffer
}

/// Read exactly one packet.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, CommandError>
where
    R: AsyncRead + Unpin,
{
    let length = reader.read_i32_le().await?;
    if !(HEADER_AND_PADDING..=MAX_RESPONSE_LEN).contains(&length) {
        return Err(CommandError::Protocol(format!(
            "invalid packet length {length}"
        )));
    }
    let id = reader.read_i32_le().await?;
    let kind = reader.read_i32_le().await?;

    let mut rest = vec![0u8; (length - 8) as usize];
    reader.read_exact(&mut rest).await?;
    // Body is followed by two nul bytes.
    rest.truncate(rest.len().saturating_sub(2));
    let body = String::from_utf8_lossy(&rest).into_owned();

    Ok(Packet { id, kind, body })
}

/// One authenticated RCON session.
pub struct RconConnection<S> {
    stream: S,
    next_id: i32,
    timeout: Duration,
}

impl<S> RconConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Authenticate over an already open stream.
    pub async fn login(stream: S, password: &str, timeout: Duration) -> Result<Self, CommandError> {
        let mut connection = Self {
            stream,
            next_id: 1,
            timeout,
        };
        let id = connection.allocate_id();
        let reply = connection
            .round_trip(&encode_packet(id, PACKET_LOGIN, password))
            .await?;
        if reply.id == -1 {
            return Err(CommandError::Auth);
        }
        if reply.id != id {
            return Err(CommandError::Protocol(format!(
                "login answered with id {} instead of {id}",
                reply.id
            )));
        }
        Ok(connection)
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id == i32::MAX {
            1
        } else {
            self.next_id + 1
        };
        id
    }

    async fn round_trip(&mut self, frame: &[u8]) -> Result<Packet, CommandError> {
        let timeout = self.timeout;
        let exchange = async {
            self.stream.write_all(frame).await?;
            self.stream.flush().await?;
            read_packet(&mut self.stream).await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| CommandError::Timeout(timeout))?
    }
}

#[async_trait]
impl<S> CommandConnection for RconConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute(&mut self, command: &str) -> Result<String, CommandError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(CommandError::Rejected(format!(
                "command is {} bytes, limit is {MAX_COMMAND_LEN}",
                command.len()
            )));
        }
        let id = self.allocate_id();
        let reply = self
            .round_trip(&encode_packet(id, PACKET_COMMAND, command))
            .await?;
        if reply.id != id {
            return Err(CommandError::Protocol(format!(
                "response id {} does not match request {id}",
                reply.id
            )));
        }
        Ok(reply.body)
    }

    async fn close(&mut self) -> Result<(), CommandError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Opens authenticated RCON sessions over TCP.
pub struct RconConnector {
    addr: String,
    password: String,
    timeout: Duration,
}

impl RconConnector {
    pub fn new(addr: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandConnector for RconConnector {
    async fn connect(&self) -> Result<Box<dyn CommandConnection>, CommandError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| CommandError::Timeout(self.timeout))?
            .map_err(|e| CommandError::Connect {
                addr: self.addr.clone(),
                message: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        let connection = RconConnection::login(stream, &self.password, self.timeout).await?;
        tracing::info!(addr = %self.addr, "RCON session established");
        Ok(Box::new(connection))
    }
}
