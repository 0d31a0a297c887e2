//! Memory area definitions.
//!
//! This module defines the area identifiers understood by the server and the
//! [`MemoryArea`] byte buffer backing each registered area.
//!
//! # Area Kinds
//!
//! | Kind | Description | Wire code |
//! |------|-------------|:---------:|
//! | PE | Process inputs | 0x81 |
//! | PA | Process outputs | 0x82 |
//! | MK | Merkers (flags) | 0x83 |
//! | DB | Data block | 0x84 |
//! | CT | Counters | 0x1C |
//! | TM | Timers | 0x1D |
//!
//! Every kind is stored the same way: a flat, fixed-size byte array.
//!
//! # Example
//!
//! ```
//! use s7_datablock::{AreaId, AreaKind, MemoryArea};
//!
//! let id = AreaId::db(1);
//! assert_eq!(id.to_string(), "DB1");
//!
//! let mut area = MemoryArea::new(id, 16);
//! area.write(4, &[0xAA, 0xBB]).unwrap();
//! assert_eq!(area.read(4, 2).unwrap(), vec![0xAA, 0xBB]);
//! assert!(area.read(15, 2).is_err());
//! ```

use crate::error::{DbError, Result};

/// Kinds of memory area a server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaKind {
    /// Process inputs.
    PE,
    /// Process outputs.
    PA,
    /// Merkers (internal flags).
    MK,
    /// Data block.
    DB,
    /// Counters.
    CT,
    /// Timers.
    TM,
}

impl AreaKind {
    /// Returns the wire code identifying this kind in request frames.
    pub(crate) fn code(self) -> u8 {
        match self {
            AreaKind::PE => 0x81,
            AreaKind::PA => 0x82,
            AreaKind::MK => 0x83,
            AreaKind::DB => 0x84,
            AreaKind::CT => 0x1C,
            AreaKind::TM => 0x1D,
        }
    }

    /// Parses a wire code back into an area kind.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidFrame` for unknown codes.
    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0x81 => Ok(AreaKind::PE),
            0x82 => Ok(AreaKind::PA),
            0x83 => Ok(AreaKind::MK),
            0x84 => Ok(AreaKind::DB),
            0x1C => Ok(AreaKind::CT),
            0x1D => Ok(AreaKind::TM),
            other => Err(DbError::invalid_frame(format!(
                "unknown area code 0x{:02X}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AreaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AreaKind::PE => write!(f, "PE"),
            AreaKind::PA => write!(f, "PA"),
            AreaKind::MK => write!(f, "MK"),
            AreaKind::DB => write!(f, "DB"),
            AreaKind::CT => write!(f, "CT"),
            AreaKind::TM => write!(f, "TM"),
        }
    }
}

/// Identifier selecting one memory area: a kind plus an index.
///
/// For data blocks the index is the DB number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaId {
    /// Area kind.
    pub kind: AreaKind,
    /// Index within the kind (DB number for data blocks).
    pub number: u16,
}

impl AreaId {
    /// Creates a new area identifier.
    pub const fn new(kind: AreaKind, number: u16) -> Self {
        Self { kind, number }
    }

    /// Shorthand for a data block identifier.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::{AreaId, AreaKind};
    ///
    /// assert_eq!(AreaId::db(3), AreaId::new(AreaKind::DB, 3));
    /// ```
    pub const fn db(number: u16) -> Self {
        Self::new(AreaKind::DB, number)
    }
}

impl std::fmt::Display for AreaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// A fixed-size, byte-addressable memory area.
///
/// The size is fixed at creation and never changes. Every access is bounds
/// checked; ranges reaching past the end are rejected, never clamped.
///
/// There is no locking at this level. The server wraps each area in its own
/// lock so that independent areas can be accessed concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArea {
    id: AreaId,
    bytes: Vec<u8>,
}

impl MemoryArea {
    /// Creates a zero-filled area of `size` bytes.
    pub fn new(id: AreaId, size: usize) -> Self {
        Self {
            id,
            bytes: vec![0; size],
        }
    }

    /// Creates an area that takes ownership of an existing buffer.
    ///
    /// The area size is the buffer length.
    pub fn from_bytes(id: AreaId, bytes: Vec<u8>) -> Self {
        Self { id, bytes }
    }

    /// Returns the area identifier.
    pub fn id(&self) -> AreaId {
        self.id
    }

    /// Returns the area size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Returns the full contents of the area.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reads `length` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::OutOfRange` if `offset + length` exceeds the area size.
    pub fn read(&self, offset: usize, length: usize) -> Result<Vec<u8>> {
        let range = self.checked_range(offset, length)?;
        Ok(self.bytes[range].to_vec())
    }

    /// Overwrites the bytes starting at `offset` with `data`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::OutOfRange` if the data does not fit. Nothing is
    /// written in that case.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let range = self.checked_range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn checked_range(&self, offset: usize, length: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(length) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(DbError::out_of_range(offset, length)),
        }
    }
}
