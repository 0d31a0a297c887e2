//! Error types for data block access.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::memory::AreaId;

/// Result type alias for data block operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors that can occur while serving or accessing data blocks.
#[derive(Debug, Error)]
pub enum DbError {
    /// The requested byte range lies outside the memory area.
    #[error("Range out of bounds: offset {offset}, length {length}")]
    OutOfRange {
        /// First byte of the requested range.
        offset: usize,
        /// Number of bytes requested.
        length: usize,
    },

    /// Bit index outside `0..=7`.
    #[error("Invalid bit index {index}: must be 0-7")]
    InvalidBitIndex {
        /// The rejected bit index.
        index: u8,
    },

    /// Fewer bytes remain in the buffer than the field needs.
    #[error("Buffer too short: need {needed} bytes at offset {offset}, buffer has {available}")]
    BufferTooShort {
        /// Offset the field starts at.
        offset: usize,
        /// Bytes the field occupies.
        needed: usize,
        /// Total length of the buffer.
        available: usize,
    },

    /// Transport failure while talking to the peer.
    #[error("Communication error: {reason}")]
    Communication {
        /// Description of the failure.
        reason: String,
    },

    /// An area with the same identifier is already registered.
    #[error("Area {0} is already registered")]
    DuplicateArea(AreaId),

    /// The requested area is not registered on the server.
    #[error("Area {0} not found")]
    AreaNotFound(AreaId),

    /// The listener could not be bound.
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// `start` was called on a server that is already running.
    #[error("Server is already running")]
    AlreadyRunning,

    /// The client has no open session.
    #[error("Client is not connected")]
    NotConnected,

    /// The server refused the request with a return code.
    #[error("Request rejected by server: return code 0x{code:02X}")]
    Rejected {
        /// Return code sent by the server.
        code: u8,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// A frame could not be decoded.
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// Description of the decoding error.
        reason: String,
    },

    /// Communication timeout.
    #[error("Communication timeout")]
    Timeout,

    /// I/O error outside of an established session.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    /// Creates a new `OutOfRange` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::DbError;
    ///
    /// let err = DbError::out_of_range(1020, 8);
    /// assert_eq!(err.to_string(), "Range out of bounds: offset 1020, length 8");
    /// ```
    pub fn out_of_range(offset: usize, length: usize) -> Self {
        Self::OutOfRange { offset, length }
    }

    /// Creates a new `BufferTooShort` error.
    pub fn buffer_too_short(offset: usize, needed: usize, available: usize) -> Self {
        Self::BufferTooShort {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new `Communication` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::DbError;
    ///
    /// let err = DbError::communication("connection reset by peer");
    /// assert!(err.is_communication());
    /// ```
    pub fn communication(reason: impl Into<String>) -> Self {
        Self::Communication {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidFrame` error.
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Returns whether the error means the session to the peer is gone.
    ///
    /// Timeouts count as well: a late response would desynchronize the
    /// request/response pairing on the stream.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::Communication { .. } | Self::Timeout | Self::Io(_) | Self::InvalidFrame { .. }
        )
    }

    /// Maps an I/O error raised inside a session to a communication error.
    pub(crate) fn from_session_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::communication(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AreaKind;

    #[test]
    fn test_out_of_range_display() {
        let err = DbError::out_of_range(1024, 1);
        assert_eq!(err.to_string(), "Range out of bounds: offset 1024, length 1");
    }

    #[test]
    fn test_invalid_bit_index_display() {
        let err = DbError::InvalidBitIndex { index: 8 };
        assert_eq!(err.to_string(), "Invalid bit index 8: must be 0-7");
    }

    #[test]
    fn test_duplicate_area_display() {
        let err = DbError::DuplicateArea(AreaId::new(AreaKind::DB, 1));
        assert_eq!(err.to_string(), "Area DB1 is already registered");
    }

    #[test]
    fn test_rejected_display() {
        let err = DbError::Rejected { code: 0x03 };
        assert_eq!(err.to_string(), "Request rejected by server: return code 0x03");
    }

    #[test]
    fn test_session_io_mapping() {
        let timeout = DbError::from_session_io(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(timeout, DbError::Timeout));

        let reset = DbError::from_session_io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(reset, DbError::Communication { .. }));
        assert!(reset.is_communication());
    }

    #[test]
    fn test_codec_errors_are_not_communication() {
        assert!(!DbError::InvalidBitIndex { index: 9 }.is_communication());
        assert!(!DbError::buffer_too_short(0, 4, 2).is_communication());
        assert!(!DbError::out_of_range(0, 1).is_communication());
    }
}
