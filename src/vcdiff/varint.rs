// Variable-length unsigned integers used for every length and address field.
//
// Base-128, most-significant group first.  Every byte except the last has
// bit 7 set.  A `u64` needs at most ten bytes.

use std::io::{self, Read, Write};

/// Maximum encoded length of a `u64` (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

/// If any of these bits are set before a `<< 7`, the shift loses data.
const OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `value` into the tail of `buf`, returning the encoded slice.
#[inline]
pub fn encode(mut value: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> &[u8] {
    let mut start = MAX_VARINT_LEN - 1;
    buf[start] = (value & 0x7F) as u8;
    value >>= 7;
    while value != 0 {
        start -= 1;
        buf[start] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
    }
    &buf[start..]
}

/// Append the encoding of `value` to an in-memory section.
#[inline]
pub fn push(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    out.extend_from_slice(encode(value, &mut buf));
}

/// Write the encoding of `value` to a sink.
pub fn write<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    w.write_all(encode(value, &mut buf))
}

/// Encoded length of `value` in bytes (1..=10).
#[inline]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a varint from the front of `data`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value & OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Read a varint one byte at a time from a stream.
///
/// End of input inside the integer is reported as `Underflow`.
pub fn read<R: Read>(r: &mut R) -> Result<u64, VarIntError> {
    let mut value: u64 = 0;
    let mut byte = [0u8; 1];
    loop {
        match r.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(VarIntError::Underflow);
            }
            Err(e) => return Err(VarIntError::Io(e)),
        }
        if value & OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        value = (value << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VarIntError {
    /// Input ended before the final byte of the integer.
    #[error("varint truncated")]
    Underflow,
    /// Value does not fit in 64 bits.
    #[error("varint overflows 64 bits")]
    Overflow,
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
