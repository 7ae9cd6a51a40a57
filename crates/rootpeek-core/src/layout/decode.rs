//! Fixed-width numeric decoding.
//!
//! Every read is bounds-checked against the buffer and honours a per-field
//! byte order. Widths other than 1, 2, 4 and 8 bytes are rejected.

use crate::error::{Error, Result};
use std::fmt;

/// Byte order of a multi-byte numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Most significant byte first (the on-disk order of ROOT files)
    #[default]
    Big,
    /// Least significant byte first
    Little,
}

/// Borrow exactly `N` bytes at `offset`.
fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    buf.get(offset..)
        .and_then(|rest| rest.get(..N))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::truncated(offset, N, buf.len().saturating_sub(offset)))
}

/// Decode an unsigned integer of `width` bytes.
pub fn read_uint(buf: &[u8], offset: usize, width: usize, order: ByteOrder) -> Result<u64> {
    let value = match (width, order) {
        (1, _) => u64::from(take::<1>(buf, offset)?[0]),
        (2, ByteOrder::Big) => u64::from(u16::from_be_bytes(take(buf, offset)?)),
        (2, ByteOrder::Little) => u64::from(u16::from_le_bytes(take(buf, offset)?)),
        (4, ByteOrder::Big) => u64::from(u32::from_be_bytes(take(buf, offset)?)),
        (4, ByteOrder::Little) => u64::from(u32::from_le_bytes(take(buf, offset)?)),
        (8, ByteOrder::Big) => u64::from_be_bytes(take(buf, offset)?),
        (8, ByteOrder::Little) => u64::from_le_bytes(take(buf, offset)?),
        _ => return Err(Error::wrong_size(format!("@{offset}"), width, width)),
    };
    Ok(value)
}

/// Decode a sign-extended integer of `width` bytes.
pub fn read_int(buf: &[u8], offset: usize, width: usize, order: ByteOrder) -> Result<i64> {
    let raw = read_uint(buf, offset, width, order)?;
    let value = match width {
        1 => i64::from(raw as u8 as i8),
        2 => i64::from(raw as u16 as i16),
        4 => i64::from(raw as u32 as i32),
        _ => raw as i64,
    };
    Ok(value)
}

/// Decode an IEEE 754 single precision float.
pub fn read_f32(buf: &[u8], offset: usize, order: ByteOrder) -> Result<f32> {
    let bits = read_uint(buf, offset, 4, order)? as u32;
    Ok(f32::from_bits(bits))
}

/// Decode an IEEE 754 double precision float.
pub fn read_f64(buf: &[u8], offset: usize, order: ByteOrder) -> Result<f64> {
    let bits = read_uint(buf, offset, 8, order)?;
    Ok(f64::from_bits(bits))
}

/// Length of the zero-terminated string starting at `offset`, terminator excluded.
pub fn strlen(buf: &[u8], offset: usize) -> Result<usize> {
    let rest = buf
        .get(offset..)
        .ok_or_else(|| Error::truncated(offset, 1, 0))?;
    rest.iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::truncated(offset, rest.len() + 1, rest.len()))
}

/// A date and time packed into a 32-bit bit-field.
///
/// Bits, most significant first: 6 bits of years since 1995, 4 bits month,
/// 5 bits day, 5 bits hour, 6 bits minute, 6 bits second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedDatetime {
    /// Calendar year
    pub year: u32,
    /// Month, 1-based
    pub month: u32,
    /// Day of the month
    pub day: u32,
    /// Hour of the day
    pub hour: u32,
    /// Minute
    pub minute: u32,
    /// Second
    pub second: u32,
}

impl PackedDatetime {
    /// Unpack the bit-field
    pub fn from_bits(bits: u32) -> Self {
        Self {
            year: (bits >> 26) + 1995,
            month: (bits >> 22) & 0xf,
            day: (bits >> 17) & 0x1f,
            hour: (bits >> 12) & 0x1f,
            minute: (bits >> 6) & 0x3f,
            second: bits & 0x3f,
        }
    }

    /// Decode a packed datetime stored at `offset`
    pub fn read(buf: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        Ok(Self::from_bits(read_uint(buf, offset, 4, order)? as u32))
    }
}

impl fmt::Display for PackedDatetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
