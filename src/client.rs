//! Field-access client for data block servers.
//!
//! This module provides the [`Client`] struct, which opens a session with a
//! data block server and reads and writes typed fields (bits, bytes, words
//! and double words) at byte offsets inside a memory area.
//!
//! # Overview
//!
//! The client handles:
//! - Session setup (rack, slot and connection type handshake)
//! - Request/response correlation via sequence numbers
//! - Return code checking
//! - Typed field access on top of raw byte ranges, via [`codec`](crate::codec)
//!
//! # Example
//!
//! ```no_run
//! use s7_datablock::{AreaId, Client, ClientConfig};
//!
//! let mut client = Client::new(ClientConfig::new());
//! let state = client.connect("192.168.0.10", 0, 1);
//! if !state.connected {
//!     eprintln!("connect failed: {:?}", state.reason);
//!     return Ok(());
//! }
//!
//! let db1 = AreaId::db(1);
//! let running = client.read_bit(db1, 1010, 2)?;
//! client.write_bit(db1, 1010, 2, !running)?;
//! let counter = client.read_dword(db1, 590)?;
//! println!("counter = {}", counter);
//!
//! client.disconnect();
//! # Ok::<(), s7_datablock::DbError>(())
//! ```
//!
//! # Bit writes
//!
//! A data block has no bit-level write request. [`Client::write_bit`] reads
//! the byte holding the bit, changes the bit locally and writes the byte
//! back: two requests with nothing tying them together on the server. If
//! another client writes the same byte between the two, one of the updates
//! is lost.
//!
//! # Failures
//!
//! Each operation produces exactly one request per range (two for
//! `write_bit`). There are no retries. When the transport fails, the session
//! is dropped and every further call returns [`DbError::NotConnected`] until
//! [`Client::connect`] is called again.

use std::time::Duration;

use log::{debug, info, warn};

use crate::codec::{self, FieldAddress};
use crate::command::{ConnectRequest, ConnectionType, ReadRequest, WriteRequest};
use crate::error::{DbError, Result};
use crate::memory::AreaId;
use crate::response::Response;
use crate::transport::{TcpTransport, DEFAULT_PORT, DEFAULT_TIMEOUT};

/// Configuration for creating a [`Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server TCP port.
    pub port: u16,
    /// Timeout for connect, send and receive.
    pub timeout: Duration,
    /// Connection type announced in the handshake.
    pub connection_type: ConnectionType,
}

impl ClientConfig {
    /// Creates a configuration with port 102, a 2 second timeout and a PG
    /// connection.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::{ClientConfig, ConnectionType};
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new()
    ///     .with_port(1102)
    ///     .with_timeout(Duration::from_secs(5))
    ///     .with_connection_type(ConnectionType::OP);
    /// assert_eq!(config.port, 1102);
    /// ```
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            connection_type: ConnectionType::default(),
        }
    }

    /// Sets the server port (default is 102).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the timeout (default is 2 seconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection type (default is PG).
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`Client::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    /// Whether a session is open.
    pub connected: bool,
    /// Why the connection attempt failed, if it did.
    pub reason: Option<String>,
}

/// Client for reading and writing fields of a remote data block.
pub struct Client {
    config: ClientConfig,
    transport: Option<TcpTransport>,
    seq: u16,
}

impl Client {
    /// Creates a disconnected client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            seq: 0,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens a session with the server at `host`.
    ///
    /// Never fails: the outcome is reported in the returned
    /// [`ConnectionState`]. Use [`try_connect`](Self::try_connect) for the
    /// error itself. An already open session is closed first.
    pub fn connect(&mut self, host: &str, rack: u8, slot: u8) -> ConnectionState {
        match self.try_connect(host, rack, slot) {
            Ok(()) => ConnectionState {
                connected: true,
                reason: None,
            },
            Err(e) => {
                warn!("Connection to {} failed: {}", host, e);
                ConnectionState {
                    connected: false,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    /// Opens a session with the server at `host`, reporting failures.
    ///
    /// # Errors
    ///
    /// - `DbError::Communication` if the server cannot be reached
    /// - `DbError::Timeout` if the handshake is not answered in time
    /// - `DbError::Rejected` if the server refuses the handshake
    pub fn try_connect(&mut self, host: &str, rack: u8, slot: u8) -> Result<()> {
        self.disconnect();

        let transport = TcpTransport::connect(host, self.config.port, self.config.timeout)?;
        let seq = self.next_seq();
        let request = ConnectRequest::new(rack, slot, self.config.connection_type);
        let handshake = transport
            .send_receive(&request.to_bytes(seq))
            .and_then(|(header, payload)| Response::from_parts(header, &payload))
            .and_then(|response| {
                response.check_seq(seq)?;
                if response.is_success() {
                    Ok(())
                } else {
                    Err(DbError::Rejected {
                        code: response.code,
                    })
                }
            });
        if let Err(e) = handshake {
            transport.shutdown();
            return Err(e);
        }

        info!(
            "Connected to {} (rack {}, slot {})",
            transport.remote_addr(),
            rack,
            slot
        );
        self.transport = Some(transport);
        Ok(())
    }

    /// Returns whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Closes the session. Does nothing if no session is open.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
            info!("Disconnected from {}", transport.remote_addr());
        }
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Sends one request frame and returns the checked response.
    ///
    /// A transport failure drops the session.
    fn exchange(&mut self, frame: &[u8], seq: u16) -> Result<Response> {
        let transport = self.transport.as_ref().ok_or(DbError::NotConnected)?;
        let result = transport
            .send_receive(frame)
            .and_then(|(header, payload)| Response::from_parts(header, &payload))
            .and_then(|response| {
                response.check_seq(seq)?;
                Ok(response)
            });

        if let Err(e) = &result {
            if e.is_communication() {
                warn!("Session lost: {}", e);
                self.disconnect();
            }
        }
        result
    }

    /// Reads `length` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// - `DbError::NotConnected` if no session is open
    /// - `DbError::InvalidParameter` if `length` is 0 or too large
    /// - `DbError::OutOfRange` if the server rejects the range
    /// - `DbError::AreaNotFound` if the area is not registered
    /// - `DbError::Communication` or `DbError::Timeout` on transport failure;
    ///   [`DbError::is_communication`] is true for both, and the session is
    ///   dropped
    pub fn read_field(&mut self, area: AreaId, offset: usize, length: usize) -> Result<Vec<u8>> {
        let request = ReadRequest::new(area, offset, length)?;
        let seq = self.next_seq();
        let response = self.exchange(&request.to_bytes(seq), seq)?;
        response.check_error(area, offset, length)?;

        if response.data.len() != length {
            return Err(DbError::invalid_frame(format!(
                "expected {} data bytes, received {}",
                length,
                response.data.len()
            )));
        }
        debug!(
            "Read {} offset {}: {}",
            area,
            offset,
            codec::format_hex_bytes(&response.data)
        );
        Ok(response.data)
    }

    /// Overwrites bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`read_field`](Self::read_field).
    pub fn write_field(&mut self, area: AreaId, offset: usize, data: &[u8]) -> Result<()> {
        let request = WriteRequest::new(area, offset, data)?;
        let seq = self.next_seq();
        let response = self.exchange(&request.to_bytes(seq), seq)?;
        response.check_error(area, offset, data.len())?;
        debug!(
            "Wrote {} offset {}: {}",
            area,
            offset,
            codec::format_hex_bytes(data)
        );
        Ok(())
    }

    /// Reads bit `bit` of the byte at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidBitIndex` if `bit` is greater than 7, without
    /// contacting the server; otherwise as [`read_field`](Self::read_field).
    pub fn read_bit(&mut self, area: AreaId, offset: usize, bit: u8) -> Result<bool> {
        FieldAddress::bit(offset, bit)?;
        let data = self.read_field(area, offset, 1)?;
        codec::get_bit(&data, 0, bit)
    }

    /// Sets bit `bit` of the byte at `offset` to `value`.
    ///
    /// Reads the byte, changes the bit and writes the byte back. The other
    /// seven bits are written back as they were read. Another client writing
    /// the same byte between the two requests loses its update, or this one
    /// does.
    ///
    /// # Errors
    ///
    /// Same as [`read_bit`](Self::read_bit).
    pub fn write_bit(&mut self, area: AreaId, offset: usize, bit: u8, value: bool) -> Result<()> {
        let address = FieldAddress::bit(offset, bit)?;
        let mut data = self.read_field(area, offset, 1)?;
        let before = data[0];
        codec::set_bit(&mut data, 0, bit, value)?;
        debug!(
            "{} {}: {} -> {}",
            area,
            address,
            codec::format_byte(before),
            codec::format_byte(data[0])
        );
        self.write_field(area, offset, &data)
    }

    /// Reads the byte at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`read_field`](Self::read_field).
    pub fn read_byte(&mut self, area: AreaId, offset: usize) -> Result<u8> {
        let data = self.read_field(area, offset, 1)?;
        codec::get_byte(&data, 0)
    }

    /// Reads a big-endian 16-bit word at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`read_field`](Self::read_field).
    pub fn read_word(&mut self, area: AreaId, offset: usize) -> Result<u16> {
        let data = self.read_field(area, offset, 2)?;
        codec::get_word(&data, 0)
    }

    /// Writes a big-endian 16-bit word at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`write_field`](Self::write_field).
    pub fn write_word(&mut self, area: AreaId, offset: usize, value: u16) -> Result<()> {
        let mut data = [0u8; 2];
        codec::set_word(&mut data, 0, value)?;
        self.write_field(area, offset, &data)
    }

    /// Reads a big-endian 32-bit double word at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`read_field`](Self::read_field).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use s7_datablock::{AreaId, Client, ClientConfig};
    ///
    /// let mut client = Client::new(ClientConfig::new());
    /// client.try_connect("127.0.0.1", 0, 1)?;
    /// let value = client.read_dword(AreaId::db(1), 590)?;
    /// println!("DB1.DBD590 = {}", value);
    /// # Ok::<(), s7_datablock::DbError>(())
    /// ```
    pub fn read_dword(&mut self, area: AreaId, offset: usize) -> Result<u32> {
        let data = self.read_field(area, offset, 4)?;
        codec::get_dword(&data, 0)
    }

    /// Writes a big-endian 32-bit double word at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`write_field`](Self::write_field).
    pub fn write_dword(&mut self, area: AreaId, offset: usize, value: u32) -> Result<()> {
        let mut data = [0u8; 4];
        codec::set_dword(&mut data, 0, value)?;
        self.write_field(area, offset, &data)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field(
                "remote_addr",
                &self.transport.as_ref().map(|t| t.remote_addr()),
            )
            .finish()
    }
}
