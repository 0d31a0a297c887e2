//! Frame header for the data block wire protocol.
//!
//! Every request and response starts with a 6-byte header:
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0 | ID | Protocol identifier (always 0x72) |
//! | 1 | FN | Function code; responses set bit 7 |
//! | 2-3 | SEQ | Sequence number, echoed in the response |
//! | 4-5 | LEN | Payload length in bytes |
//!
//! All multi-byte fields are big-endian.
//!
//! # Example
//!
//! ```
//! use s7_datablock::{FrameHeader, Function, FRAME_HEADER_SIZE};
//!
//! let header = FrameHeader::new_request(Function::Read, 0x0001, 9);
//! let bytes = header.to_bytes();
//! assert_eq!(bytes.len(), FRAME_HEADER_SIZE);
//!
//! let reply = header.response(3);
//! assert!(reply.is_response());
//! assert_eq!(reply.seq, header.seq);
//! ```

use crate::error::{DbError, Result};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 6;

/// Protocol identifier carried in the first header byte.
pub const PROTOCOL_ID: u8 = 0x72;

const RESPONSE_FLAG: u8 = 0x80;

/// Function carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Session setup (rack, slot, connection type).
    Connect,
    /// Read a byte range.
    Read,
    /// Write a byte range.
    Write,
}

impl Function {
    pub(crate) fn code(self) -> u8 {
        match self {
            Function::Connect => 0x01,
            Function::Read => 0x04,
            Function::Write => 0x05,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0x01 => Ok(Function::Connect),
            0x04 => Ok(Function::Read),
            0x05 => Ok(Function::Write),
            other => Err(DbError::invalid_frame(format!(
                "unknown function 0x{:02X}",
                other
            ))),
        }
    }
}

/// Frame header (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Function of this frame.
    pub function: Function,
    /// Whether this frame is a response.
    pub response: bool,
    /// Sequence number used to pair responses with requests.
    pub seq: u16,
    /// Payload length following the header.
    pub length: u16,
}

impl FrameHeader {
    /// Creates a request header.
    pub fn new_request(function: Function, seq: u16, length: u16) -> Self {
        Self {
            function,
            response: false,
            seq,
            length,
        }
    }

    /// Creates the response header matching this request.
    pub fn response(self, length: u16) -> Self {
        Self {
            response: true,
            length,
            ..self
        }
    }

    /// Returns whether this is a response header.
    pub fn is_response(self) -> bool {
        self.response
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; FRAME_HEADER_SIZE] {
        let flag = if self.response { RESPONSE_FLAG } else { 0 };
        let [seq_hi, seq_lo] = self.seq.to_be_bytes();
        let [len_hi, len_lo] = self.length.to_be_bytes();
        [
            PROTOCOL_ID,
            self.function.code() | flag,
            seq_hi,
            seq_lo,
            len_hi,
            len_lo,
        ]
    }

    /// Parses a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` if the slice is too short, the protocol
    /// id is wrong, or the function code is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::{FrameHeader, Function};
    ///
    /// let header = FrameHeader::from_bytes(&[0x72, 0x84, 0x00, 0x07, 0x00, 0x05]).unwrap();
    /// assert_eq!(header.function, Function::Read);
    /// assert!(header.is_response());
    /// assert_eq!(header.seq, 7);
    /// assert_eq!(header.length, 5);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(DbError::invalid_frame(format!(
                "header too short: expected {} bytes, got {}",
                FRAME_HEADER_SIZE,
                data.len()
            )));
        }
        if data[0] != PROTOCOL_ID {
            return Err(DbError::invalid_frame(format!(
                "bad protocol id 0x{:02X}",
                data[0]
            )));
        }

        Ok(Self {
            function: Function::from_code(data[1] & !RESPONSE_FLAG)?,
            response: data[1] & RESPONSE_FLAG != 0,
            seq: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_to_bytes() {
        let header = FrameHeader::new_request(Function::Write, 0x0102, 0x000B);
        assert_eq!(
            header.to_bytes().to_vec(),
            hex::decode("72050102000b").unwrap()
        );
    }

    #[test]
    fn test_response_to_bytes() {
        let header = FrameHeader::new_request(Function::Connect, 0xFFFF, 4).response(1);
        assert_eq!(
            header.to_bytes().to_vec(),
            hex::decode("7281ffff0001").unwrap()
        );
    }

    #[test]
    fn test_from_bytes() {
        let header = FrameHeader::from_bytes(&hex::decode("720400090009").unwrap()).unwrap();
        assert_eq!(header.function, Function::Read);
        assert!(!header.is_response());
        assert_eq!(header.seq, 9);
        assert_eq!(header.length, 9);
    }

    #[test]
    fn test_from_bytes_too_short() {
        assert!(FrameHeader::from_bytes(&[0x72, 0x04]).is_err());
    }

    #[test]
    fn test_from_bytes_bad_id() {
        let result = FrameHeader::from_bytes(&[0x03, 0x04, 0, 0, 0, 0]);
        assert!(matches!(result, Err(DbError::InvalidFrame { .. })));
    }

    #[test]
    fn test_from_bytes_unknown_function() {
        assert!(FrameHeader::from_bytes(&[0x72, 0x09, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_header_roundtrip() {
        let original = FrameHeader::new_request(Function::Read, 0xBEEF, 0x1234).response(2);
        let parsed = FrameHeader::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, parsed);
    }
}
