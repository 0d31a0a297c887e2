//! Response framing, parsing and validation.
//!
//! A response consists of:
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | Header | 6 bytes | Frame header echoing the request function and sequence |
//! | Return code | 1 byte | 0xFF on success, see [`ReturnCode`] |
//! | Data | Variable | Bytes read (read responses only) |
//!
//! # Example
//!
//! ```
//! use s7_datablock::{Response, ReturnCode};
//!
//! let bytes = [
//!     0x72, 0x84, 0x00, 0x01, 0x00, 0x02, // header
//!     0xFF, // success
//!     0x04, // data
//! ];
//! let response = Response::from_bytes(&bytes).unwrap();
//! assert!(response.is_success());
//! assert_eq!(response.data, vec![0x04]);
//! ```

use crate::error::{DbError, Result};
use crate::header::{FrameHeader, FRAME_HEADER_SIZE};
use crate::memory::AreaId;

/// Result of a request as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Request served.
    Success,
    /// Range outside the area bounds.
    InvalidAddress,
    /// Area not registered.
    NotFound,
    /// Request malformed or not allowed in the session state.
    InvalidRequest,
}

impl ReturnCode {
    /// Returns the wire byte for this code.
    pub fn code(self) -> u8 {
        match self {
            ReturnCode::Success => 0xFF,
            ReturnCode::InvalidAddress => 0x05,
            ReturnCode::NotFound => 0x0A,
            ReturnCode::InvalidRequest => 0x03,
        }
    }

    /// Parses a wire byte; unknown bytes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xFF => Some(ReturnCode::Success),
            0x05 => Some(ReturnCode::InvalidAddress),
            0x0A => Some(ReturnCode::NotFound),
            0x03 => Some(ReturnCode::InvalidRequest),
            _ => None,
        }
    }

    /// Picks the code reported for a failed request.
    pub(crate) fn for_error(err: &DbError) -> Self {
        match err {
            DbError::OutOfRange { .. } => ReturnCode::InvalidAddress,
            DbError::AreaNotFound(_) => ReturnCode::NotFound,
            _ => ReturnCode::InvalidRequest,
        }
    }
}

/// Parsed response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Response header.
    pub header: FrameHeader,
    /// Raw return code.
    pub code: u8,
    /// Response data (if any).
    pub data: Vec<u8>,
}

impl Response {
    /// Builds the response to the request identified by `request`.
    pub fn new(request: FrameHeader, code: ReturnCode, data: Vec<u8>) -> Self {
        Self {
            header: request.response((1 + data.len()) as u16),
            code: code.code(),
            data,
        }
    }

    /// Serializes the response for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + 1 + self.data.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.push(self.code);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parses a response from a header and its payload.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` if the header is not a response or the
    /// payload is empty.
    pub fn from_parts(header: FrameHeader, payload: &[u8]) -> Result<Self> {
        if !header.is_response() {
            return Err(DbError::invalid_frame("expected a response frame"));
        }
        let (&code, data) = payload
            .split_first()
            .ok_or_else(|| DbError::invalid_frame("response without return code"))?;

        Ok(Self {
            header,
            code,
            data: data.to_vec(),
        })
    }

    /// Parses a complete response frame.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` if the frame is truncated or malformed.
    pub fn from_bytes(frame: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(frame)?;
        let payload = &frame[FRAME_HEADER_SIZE..];
        if payload.len() != header.length as usize {
            return Err(DbError::invalid_frame(format!(
                "payload length mismatch: header says {}, got {}",
                header.length,
                payload.len()
            )));
        }
        Self::from_parts(header, payload)
    }

    /// Returns whether the server reported success.
    pub fn is_success(&self) -> bool {
        self.code == ReturnCode::Success.code()
    }

    /// Validates the sequence number matches the request.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` on mismatch.
    pub fn check_seq(&self, expected: u16) -> Result<()> {
        if self.header.seq == expected {
            Ok(())
        } else {
            Err(DbError::invalid_frame(format!(
                "sequence mismatch: expected {}, received {}",
                expected, self.header.seq
            )))
        }
    }

    /// Converts the return code into a result for a range request.
    ///
    /// `area`, `offset` and `length` describe the request, so that a rejected
    /// range surfaces as `DbError::OutOfRange` with the caller's values.
    ///
    /// # Errors
    ///
    /// - `DbError::OutOfRange` for [`ReturnCode::InvalidAddress`]
    /// - `DbError::AreaNotFound` for [`ReturnCode::NotFound`]
    /// - `DbError::Rejected` for any other non-success code
    pub fn check_error(&self, area: AreaId, offset: usize, length: usize) -> Result<()> {
        match ReturnCode::from_code(self.code) {
            Some(ReturnCode::Success) => Ok(()),
            Some(ReturnCode::InvalidAddress) => Err(DbError::out_of_range(offset, length)),
            Some(ReturnCode::NotFound) => Err(DbError::AreaNotFound(area)),
            _ => Err(DbError::Rejected { code: self.code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Function;

    fn make_response(code: u8, data: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0x72, 0x84, 0x00, 0x01, 0x00, (1 + data.len()) as u8, code];
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn test_from_bytes_success() {
        let response = Response::from_bytes(&make_response(0xFF, &[0x12, 0x34])).unwrap();
        assert_eq!(response.header.function, Function::Read);
        assert_eq!(response.header.seq, 1);
        assert!(response.is_success());
        assert_eq!(response.data, vec![0x12, 0x34]);
    }

    #[test]
    fn test_from_bytes_length_mismatch() {
        let mut bytes = make_response(0xFF, &[0x12, 0x34]);
        bytes.pop();
        assert!(Response::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_request_frame_is_not_a_response() {
        let bytes = [0x72, 0x04, 0x00, 0x01, 0x00, 0x01, 0xFF];
        assert!(Response::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_new_echoes_request() {
        let request = FrameHeader::new_request(Function::Write, 42, 13);
        let response = Response::new(request, ReturnCode::Success, Vec::new());
        assert_eq!(response.to_bytes(), vec![0x72, 0x85, 0x00, 0x2A, 0x00, 0x01, 0xFF]);
    }

    #[test]
    fn test_check_error_mapping() {
        let area = AreaId::db(1);

        let ok = Response::from_bytes(&make_response(0xFF, &[])).unwrap();
        assert!(ok.check_error(area, 0, 1).is_ok());

        let range = Response::from_bytes(&make_response(0x05, &[])).unwrap();
        assert!(matches!(
            range.check_error(area, 1024, 1),
            Err(DbError::OutOfRange {
                offset: 1024,
                length: 1
            })
        ));

        let missing = Response::from_bytes(&make_response(0x0A, &[])).unwrap();
        assert!(matches!(
            missing.check_error(area, 0, 1),
            Err(DbError::AreaNotFound(id)) if id == area
        ));

        let odd = Response::from_bytes(&make_response(0x42, &[])).unwrap();
        assert!(matches!(
            odd.check_error(area, 0, 1),
            Err(DbError::Rejected { code: 0x42 })
        ));
    }

    #[test]
    fn test_check_seq() {
        let response = Response::from_bytes(&make_response(0xFF, &[])).unwrap();
        assert!(response.check_seq(1).is_ok());
        assert!(response.check_seq(2).is_err());
    }

    #[test]
    fn test_return_code_for_error() {
        assert_eq!(
            ReturnCode::for_error(&DbError::out_of_range(0, 1)),
            ReturnCode::InvalidAddress
        );
        assert_eq!(
            ReturnCode::for_error(&DbError::AreaNotFound(AreaId::db(9))),
            ReturnCode::NotFound
        );
        assert_eq!(
            ReturnCode::for_error(&DbError::invalid_frame("x")),
            ReturnCode::InvalidRequest
        );
    }
}
