//! Low-level byte encodings shared by the dictionary streams
//!
//! - Varint encoding (1-10 bytes per integer) for name deltas and entry info
//! - Fixed-width big-endian integers sized by `bytes_required` for offset tables
//! - `ByteReader`: a cheap cursor over a borrowed (usually mmapped) buffer

use crate::{Result, StorageError};

/// Append a u64 using Varint encoding
///
/// Format:
/// - Each byte: [continuation_bit:1][data:7]
/// - If continuation_bit=1, more bytes follow
/// - Little-endian group order
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        out.push(byte);

        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `write_varint` emits for `value`
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Smallest byte width (1..=8) able to hold `max_value`
pub fn bytes_required(max_value: u64) -> usize {
    let bits = 64 - max_value.leading_zeros() as usize;
    bits.max(1).div_ceil(8)
}

/// Write the low `width` bytes of `value` big-endian
pub fn write_fixed(out: &mut Vec<u8>, value: u64, width: usize) {
    debug_assert!((1..=8).contains(&width));
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[8 - width..]);
}

/// Read a `width`-byte big-endian value at slot `index` of a fixed-width table
pub fn read_fixed_slot(table: &[u8], index: usize, width: usize) -> Result<u64> {
    let start = index
        .checked_mul(width)
        .ok_or_else(|| StorageError::Corruption("offset table index overflow".into()))?;
    let end = start + width;
    if end > table.len() {
        return Err(StorageError::Corruption(format!(
            "offset table slot {} out of bounds ({} bytes)",
            index,
            table.len()
        )));
    }
    let mut value = 0u64;
    for &b in &table[start..end] {
        value = (value << 8) | b as u64;
    }
    Ok(value)
}

/// Cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| StorageError::Corruption("unexpected end of stream".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                StorageError::Corruption(format!(
                    "truncated stream: need {} bytes at {}, have {}",
                    len,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0;

        loop {
            let byte = self.read_u8()?;

            if shift >= 64 || (shift == 63 && (byte & 0x7F) > 1) {
                return Err(StorageError::Corruption("Varint overflow".into()));
            }

            // Extract 7 data bits
            value |= ((byte & 0x7F) as u64) << shift;
            shift += 7;

            // Check continuation bit
            if (byte & 0x80) == 0 {
                break;
            }
        }

        Ok(value)
    }

    pub fn read_i64_be(&mut self) -> Result<i64> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(arr))
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(arr))
    }
}
