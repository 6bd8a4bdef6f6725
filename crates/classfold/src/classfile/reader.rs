//! Big-endian cursor over class file bytes.
//!
//! Class files are both read and written back, and untouched parts must
//! come out byte-identical. None of the crates in use parses or serializes
//! the class file format, so parsing runs over this small cursor and
//! serialization over the matching `put_*` helpers.

use anyhow::{bail, Result};

/// Reads the big-endian primitives class files are made of.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position, relative to the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).unwrap_or(usize::MAX);
        if end > self.data.len() {
            bail!(
                "unexpected end of data: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.data.len() - self.pos
            );
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn u64(&mut self) -> Result<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }
}

/// Appends a big-endian `u16`.
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `u32`.
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_values() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0xFF];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u32().unwrap(), 0xCAFEBABE);
        assert_eq!(r.u16().unwrap(), 52);
        assert_eq!(r.i8().unwrap(), -1);
        assert!(r.is_empty());
    }

    #[test]
    fn short_read_is_an_error() {
        let mut r = ByteReader::new(&[0x01]);
        assert!(r.u16().is_err());
        // A failed read does not consume anything.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn u64_combines_two_words() {
        let mut r = ByteReader::new(&[0, 0, 0, 1, 0x20, 0x3C, 0x32, 0xFF]);
        assert_eq!(r.u64().unwrap(), 4_835_783_423);
    }
}
