//! Request structures and serialization.
//!
//! This module contains the requests a client can send to a data block
//! server. Each request validates its parameters on construction and handles
//! its own serialization; the server side decodes them with
//! [`Request::decode`].
//!
//! # Request Types
//!
//! - [`ConnectRequest`] - Open a session (rack, slot, connection type)
//! - [`ReadRequest`] - Read a byte range from a memory area
//! - [`WriteRequest`] - Overwrite a byte range in a memory area
//!
//! # Payload Layout
//!
//! | Request | Payload |
//! |---------|---------|
//! | Connect | rack (1), slot (1), connection type (2) |
//! | Read | area code (1), area number (2), offset (4), length (2) |
//! | Write | area code (1), area number (2), offset (4), length (2), data (length) |
//!
//! # Example
//!
//! ```
//! use s7_datablock::{AreaId, ReadRequest};
//!
//! let cmd = ReadRequest::new(AreaId::db(1), 1010, 1).unwrap();
//! let bytes = cmd.to_bytes(0x0001);
//! assert_eq!(bytes.len(), 6 + 9);
//! ```

use crate::error::{DbError, Result};
use crate::header::{FrameHeader, Function, FRAME_HEADER_SIZE};
use crate::memory::{AreaId, AreaKind};

/// Maximum number of data bytes a single read or write may carry.
pub const MAX_DATA_LENGTH: u16 = 16384;

const CONNECT_PAYLOAD_LEN: usize = 4;
const RANGE_PAYLOAD_LEN: usize = 9;

/// Connection type announced during the session handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// Programming device (default).
    #[default]
    PG,
    /// Operator panel.
    OP,
    /// Basic S7 connection.
    S7Basic,
}

impl ConnectionType {
    pub(crate) fn code(self) -> u16 {
        match self {
            ConnectionType::PG => 0x0001,
            ConnectionType::OP => 0x0002,
            ConnectionType::S7Basic => 0x0003,
        }
    }

    pub(crate) fn from_code(code: u16) -> Result<Self> {
        match code {
            0x0001 => Ok(ConnectionType::PG),
            0x0002 => Ok(ConnectionType::OP),
            0x0003 => Ok(ConnectionType::S7Basic),
            other => Err(DbError::invalid_frame(format!(
                "unknown connection type 0x{:04X}",
                other
            ))),
        }
    }
}

/// Session setup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Rack of the target CPU.
    pub rack: u8,
    /// Slot of the target CPU.
    pub slot: u8,
    /// Announced connection type.
    pub connection_type: ConnectionType,
}

impl ConnectRequest {
    /// Creates a new connect request.
    pub fn new(rack: u8, slot: u8, connection_type: ConnectionType) -> Self {
        Self {
            rack,
            slot,
            connection_type,
        }
    }

    /// Serializes the request with the given sequence number.
    pub fn to_bytes(&self, seq: u16) -> Vec<u8> {
        let header =
            FrameHeader::new_request(Function::Connect, seq, CONNECT_PAYLOAD_LEN as u16);
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + CONNECT_PAYLOAD_LEN);
        bytes.extend_from_slice(&header.to_bytes());
        bytes.push(self.rack);
        bytes.push(self.slot);
        bytes.extend_from_slice(&self.connection_type.code().to_be_bytes());
        bytes
    }
}

/// Request reading a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Area to read from.
    pub area: AreaId,
    /// First byte of the range.
    pub offset: u32,
    /// Number of bytes to read.
    pub length: u16,
}

impl ReadRequest {
    /// Creates a new read request.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidParameter` if `length` is 0 or exceeds
    /// [`MAX_DATA_LENGTH`], or if `offset` does not fit in 32 bits.
    pub fn new(area: AreaId, offset: usize, length: usize) -> Result<Self> {
        Ok(Self {
            area,
            offset: wire_offset(offset)?,
            length: wire_length(length)?,
        })
    }

    /// Serializes the request with the given sequence number.
    pub fn to_bytes(&self, seq: u16) -> Vec<u8> {
        let header = FrameHeader::new_request(Function::Read, seq, RANGE_PAYLOAD_LEN as u16);
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + RANGE_PAYLOAD_LEN);
        bytes.extend_from_slice(&header.to_bytes());
        push_range(&mut bytes, self.area, self.offset, self.length);
        bytes
    }
}

/// Request overwriting a byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Area to write to.
    pub area: AreaId,
    /// First byte of the range.
    pub offset: u32,
    /// Bytes to write.
    pub data: Vec<u8>,
}

impl WriteRequest {
    /// Creates a new write request.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidParameter` if `data` is empty or longer than
    /// [`MAX_DATA_LENGTH`], or if `offset` does not fit in 32 bits.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::{AreaId, WriteRequest};
    ///
    /// assert!(WriteRequest::new(AreaId::db(1), 0, &[0x01]).is_ok());
    /// assert!(WriteRequest::new(AreaId::db(1), 0, &[]).is_err());
    /// ```
    pub fn new(area: AreaId, offset: usize, data: &[u8]) -> Result<Self> {
        wire_length(data.len())?;
        Ok(Self {
            area,
            offset: wire_offset(offset)?,
            data: data.to_vec(),
        })
    }

    /// Serializes the request with the given sequence number.
    pub fn to_bytes(&self, seq: u16) -> Vec<u8> {
        let payload_len = RANGE_PAYLOAD_LEN + self.data.len();
        let header = FrameHeader::new_request(Function::Write, seq, payload_len as u16);
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);
        bytes.extend_from_slice(&header.to_bytes());
        push_range(&mut bytes, self.area, self.offset, self.data.len() as u16);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// A decoded request, as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Session setup.
    Connect(ConnectRequest),
    /// Range read.
    Read(ReadRequest),
    /// Range write.
    Write(WriteRequest),
}

impl Request {
    /// Decodes a request payload for the function named in `header`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` if the payload is malformed, and
    /// `DbError::InvalidParameter` if the requested length is 0 or too large.
    pub fn decode(header: &FrameHeader, payload: &[u8]) -> Result<Self> {
        match header.function {
            Function::Connect => {
                expect_len(payload, CONNECT_PAYLOAD_LEN, "connect")?;
                Ok(Request::Connect(ConnectRequest {
                    rack: payload[0],
                    slot: payload[1],
                    connection_type: ConnectionType::from_code(u16::from_be_bytes([
                        payload[2], payload[3],
                    ]))?,
                }))
            }
            Function::Read => {
                expect_len(payload, RANGE_PAYLOAD_LEN, "read")?;
                let (area, offset, length) = parse_range(payload)?;
                wire_length(length as usize)?;
                Ok(Request::Read(ReadRequest {
                    area,
                    offset,
                    length,
                }))
            }
            Function::Write => {
                if payload.len() < RANGE_PAYLOAD_LEN {
                    return Err(DbError::invalid_frame("write payload too short"));
                }
                let (area, offset, length) = parse_range(payload)?;
                wire_length(length as usize)?;
                expect_len(payload, RANGE_PAYLOAD_LEN + length as usize, "write")?;
                Ok(Request::Write(WriteRequest {
                    area,
                    offset,
                    data: payload[RANGE_PAYLOAD_LEN..].to_vec(),
                }))
            }
        }
    }
}

fn wire_offset(offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .map_err(|_| DbError::invalid_parameter("offset", "must fit in 32 bits"))
}

fn wire_length(length: usize) -> Result<u16> {
    if length == 0 {
        return Err(DbError::invalid_parameter(
            "length",
            "must be greater than 0",
        ));
    }
    if length > MAX_DATA_LENGTH as usize {
        return Err(DbError::invalid_parameter(
            "length",
            format!("must not exceed {}", MAX_DATA_LENGTH),
        ));
    }
    Ok(length as u16)
}

fn push_range(bytes: &mut Vec<u8>, area: AreaId, offset: u32, length: u16) {
    bytes.push(area.kind.code());
    bytes.extend_from_slice(&area.number.to_be_bytes());
    bytes.extend_from_slice(&offset.to_be_bytes());
    bytes.extend_from_slice(&length.to_be_bytes());
}

fn parse_range(payload: &[u8]) -> Result<(AreaId, u32, u16)> {
    let kind = AreaKind::from_code(payload[0])?;
    let number = u16::from_be_bytes([payload[1], payload[2]]);
    let offset = u32::from_be_bytes([payload[3], payload[4], payload[5], payload[6]]);
    let length = u16::from_be_bytes([payload[7], payload[8]]);
    Ok((AreaId::new(kind, number), offset, length))
}

fn expect_len(payload: &[u8], expected: usize, what: &str) -> Result<()> {
    if payload.len() != expected {
        return Err(DbError::invalid_frame(format!(
            "{} payload: expected {} bytes, got {}",
            what,
            expected,
            payload.len()
        )));
    }
    Ok(())
}
