//! Field codec: typed values over raw byte ranges.
//!
//! Pure functions translating between byte buffers and bits, 16-bit words and
//! 32-bit double words. Multi-byte values are big-endian (most significant
//! byte first). Nothing here performs I/O.
//!
//! # Example
//!
//! ```
//! use s7_datablock::codec::{get_bit, get_dword, get_word, set_bit};
//!
//! let mut data = [0b0000_0001, 0x12, 0x34];
//!
//! assert!(get_bit(&data, 0, 0).unwrap());
//! assert!(!get_bit(&data, 0, 2).unwrap());
//!
//! set_bit(&mut data, 0, 2, true).unwrap();
//! assert_eq!(data[0], 0b0000_0101);
//!
//! assert_eq!(get_word(&data, 1).unwrap(), 0x1234);
//! assert_eq!(get_dword(&[0x00, 0x00, 0x02, 0x4A], 0).unwrap(), 0x24A);
//! ```
//!
//! # Read-modify-write
//!
//! [`set_bit`] changes exactly one bit of a byte the caller already holds.
//! To change a bit in a remote area, read the byte, call `set_bit`, and write
//! the byte back. The codec never talks to a memory area itself.

use crate::error::{DbError, Result};

/// Highest valid bit index within a byte.
pub const MAX_BIT_INDEX: u8 = 7;

fn check_bit_index(bit: u8) -> Result<()> {
    if bit > MAX_BIT_INDEX {
        return Err(DbError::InvalidBitIndex { index: bit });
    }
    Ok(())
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| DbError::buffer_too_short(offset, N, bytes.len()))
}

fn field_mut<const N: usize>(bytes: &mut [u8], offset: usize) -> Result<&mut [u8]> {
    let available = bytes.len();
    match offset.checked_add(N) {
        Some(end) if end <= available => Ok(&mut bytes[offset..end]),
        _ => Err(DbError::buffer_too_short(offset, N, available)),
    }
}

/// Reads one byte.
///
/// # Errors
///
/// Returns `DbError::BufferTooShort` if `offset` is past the end of `bytes`.
pub fn get_byte(bytes: &[u8], offset: usize) -> Result<u8> {
    field::<1>(bytes, offset).map(|[b]| b)
}

/// Gets a single bit of the byte at `offset`.
///
/// # Arguments
///
/// * `bytes` - Buffer to read from
/// * `offset` - Index of the byte within `bytes`
/// * `bit` - Bit position (0-7, where 0 is LSB)
///
/// # Errors
///
/// - `DbError::InvalidBitIndex` if `bit` > 7
/// - `DbError::BufferTooShort` if `offset` is past the end of `bytes`
///
/// # Example
///
/// ```
/// use s7_datablock::codec::get_bit;
///
/// let data = [0b0000_0100];
/// assert!(get_bit(&data, 0, 2).unwrap());
/// assert!(!get_bit(&data, 0, 1).unwrap());
/// assert!(get_bit(&data, 0, 8).is_err());
/// ```
pub fn get_bit(bytes: &[u8], offset: usize, bit: u8) -> Result<bool> {
    check_bit_index(bit)?;
    let byte = get_byte(bytes, offset)?;
    Ok((byte >> bit) & 1 == 1)
}

/// Sets or clears a single bit of the byte at `offset`.
///
/// The other seven bits of that byte are left unchanged.
///
/// # Errors
///
/// - `DbError::InvalidBitIndex` if `bit` > 7
/// - `DbError::BufferTooShort` if `offset` is past the end of `bytes`
///
/// # Example
///
/// ```
/// use s7_datablock::codec::set_bit;
///
/// let mut data = [0b1111_0000];
/// set_bit(&mut data, 0, 1, true).unwrap();
/// assert_eq!(data[0], 0b1111_0010);
/// set_bit(&mut data, 0, 7, false).unwrap();
/// assert_eq!(data[0], 0b0111_0010);
/// ```
pub fn set_bit(bytes: &mut [u8], offset: usize, bit: u8, value: bool) -> Result<()> {
    check_bit_index(bit)?;
    let slot = field_mut::<1>(bytes, offset)?;
    if value {
        slot[0] |= 1 << bit;
    } else {
        slot[0] &= !(1 << bit);
    }
    Ok(())
}

/// Reads a big-endian 16-bit word starting at `offset`.
///
/// # Errors
///
/// Returns `DbError::BufferTooShort` if fewer than 2 bytes remain from `offset`.
///
/// # Example
///
/// ```
/// use s7_datablock::codec::get_word;
///
/// assert_eq!(get_word(&[0x12, 0x34], 0).unwrap(), 0x1234);
/// assert!(get_word(&[0x12], 0).is_err());
/// ```
pub fn get_word(bytes: &[u8], offset: usize) -> Result<u16> {
    field::<2>(bytes, offset).map(u16::from_be_bytes)
}

/// Writes a big-endian 16-bit word starting at `offset`.
///
/// # Errors
///
/// Returns `DbError::BufferTooShort` if fewer than 2 bytes remain from `offset`.
pub fn set_word(bytes: &mut [u8], offset: usize, value: u16) -> Result<()> {
    field_mut::<2>(bytes, offset)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Reads a big-endian 32-bit double word starting at `offset`.
///
/// # Errors
///
/// Returns `DbError::BufferTooShort` if fewer than 4 bytes remain from `offset`.
///
/// # Example
///
/// ```
/// use s7_datablock::codec::get_dword;
///
/// assert_eq!(get_dword(&[0x00, 0x00, 0x02, 0x4A], 0).unwrap(), 0x24A);
/// ```
pub fn get_dword(bytes: &[u8], offset: usize) -> Result<u32> {
    field::<4>(bytes, offset).map(u32::from_be_bytes)
}

/// Writes a big-endian 32-bit double word starting at `offset`.
///
/// # Errors
///
/// Returns `DbError::BufferTooShort` if fewer than 4 bytes remain from `offset`.
pub fn set_dword(bytes: &mut [u8], offset: usize, value: u32) -> Result<()> {
    field_mut::<4>(bytes, offset)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Formats a byte as binary with a nibble separator.
///
/// # Example
///
/// ```
/// use s7_datablock::codec::format_byte;
///
/// assert_eq!(format_byte(0x04), "0b0000_0100");
/// ```
pub fn format_byte(value: u8) -> String {
    format!("0b{:04b}_{:04b}", value >> 4, value & 0x0F)
}

/// Formats bytes as space-separated uppercase hex.
///
/// # Example
///
/// ```
/// use s7_datablock::codec::format_hex_bytes;
///
/// assert_eq!(format_hex_bytes(&[0x00, 0x02, 0x4A]), "00 02 4A");
/// ```
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Address of a field inside an area: a byte offset and, for bits, the bit
/// index within that byte.
///
/// Parses from and prints as `"1010"` (byte) or `"1010.2"` (bit).
///
/// # Example
///
/// ```
/// use s7_datablock::codec::FieldAddress;
///
/// let addr: FieldAddress = "1010.2".parse().unwrap();
/// assert_eq!(addr.byte_offset, 1010);
/// assert_eq!(addr.bit_index, Some(2));
/// assert_eq!(addr.to_string(), "1010.2");
/// assert!("1010.8".parse::<FieldAddress>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAddress {
    /// Byte offset within the area.
    pub byte_offset: usize,
    /// Bit index within the byte, `None` for byte-aligned fields.
    pub bit_index: Option<u8>,
}

impl FieldAddress {
    /// Address of a byte-aligned field.
    pub fn byte(byte_offset: usize) -> Self {
        Self {
            byte_offset,
            bit_index: None,
        }
    }

    /// Address of a single bit.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidBitIndex` if `bit_index` is greater than 7.
    pub fn bit(byte_offset: usize, bit_index: u8) -> Result<Self> {
        check_bit_index(bit_index)?;
        Ok(Self {
            byte_offset,
            bit_index: Some(bit_index),
        })
    }
}

impl std::fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bit_index {
            Some(bit) => write!(f, "{}.{}", self.byte_offset, bit),
            None => write!(f, "{}", self.byte_offset),
        }
    }
}

impl std::str::FromStr for FieldAddress {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            |reason: &str| DbError::invalid_parameter("address", format!("{:?}: {}", s, reason));
        let (byte, bit) = match s.split_once('.') {
            Some((byte, bit)) => (byte, Some(bit)),
            None => (s, None),
        };
        let byte_offset = byte
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid("bad byte offset"))?;
        match bit {
            Some(bit) => {
                let bit = bit.trim().parse::<u8>().map_err(|_| invalid("bad bit index"))?;
                Self::bit(byte_offset, bit)
            }
            None => Ok(Self::byte(byte_offset)),
        }
    }
}
