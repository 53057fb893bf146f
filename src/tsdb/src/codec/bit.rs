//! Bit-granular streams backing the XOR chunk encoding. Bits are packed most significant first.

use crate::codec::varint::MAX_VARINT_LEN64;
use crate::codec::zigzag::{zig_zag_decode, zig_zag_encode};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bit {
    Zero,
    One,
}

impl Bit {
    pub fn to_u64(self) -> u64 {
        match self {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }
}

fn eof() -> Error {
    Error::Corrupted("bit stream: unexpected end of data".to_string())
}

/// BitWriter appends bits to a growing buffer.
#[derive(Debug, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    // bits used in the last byte of `buf`; 8 means there is no room left
    pos: u32,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            pos: 8,
        }
    }

    fn last_index(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bit(&mut self, bit: Bit) {
        if self.pos == 8 {
            self.buf.push(0);
            self.pos = 0;
        }

        if bit == Bit::One {
            let i = self.last_index();
            self.buf[i] |= 1u8 << (7 - self.pos);
        }

        self.pos += 1;
    }

    pub fn write_byte(&mut self, byte: u8) {
        if self.pos == 8 {
            self.buf.push(byte);
            return;
        }

        // split the byte over the tail of the current byte and the head of a new one
        let i = self.last_index();
        self.buf[i] |= byte >> self.pos;
        self.buf.push(byte << (8 - self.pos));
    }

    /// write_bits writes the low `num` bits of `bits`, most significant first.
    pub fn write_bits(&mut self, bits: u64, num: u32) {
        let mut num = num.min(64);
        if num == 0 {
            return;
        }

        let mut bits = bits << (64 - num);
        while num >= 8 {
            self.write_byte((bits >> 56) as u8);
            bits <<= 8;
            num -= 8;
        }

        while num > 0 {
            if bits >> 63 == 1 {
                self.write_bit(Bit::One);
            } else {
                self.write_bit(Bit::Zero);
            }
            bits <<= 1;
            num -= 1;
        }
    }

    pub fn write_uvarint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.write_byte((v as u8) | 0x80);
            v >>= 7;
        }
        self.write_byte(v as u8);
    }

    pub fn write_varint(&mut self, v: i64) {
        self.write_uvarint(zig_zag_encode(v));
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// BitReader reads bits back from a slice written by a `BitWriter`.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    index: usize,
    // bits consumed from `bytes[index]`
    pos: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            index: 0,
            pos: 0,
        }
    }

    fn get_byte(&self, index: usize) -> Result<u8> {
        self.bytes.get(index).copied().ok_or_else(eof)
    }

    pub fn read_bit(&mut self) -> Result<Bit> {
        if self.pos == 8 {
            self.index += 1;
            self.pos = 0;
        }

        let byte = self.get_byte(self.index)?;
        let bit = if byte & (1u8 << (7 - self.pos)) == 0 {
            Bit::Zero
        } else {
            Bit::One
        };
        self.pos += 1;

        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos == 8 {
            let byte = self.get_byte(self.index + 1)?;
            self.index += 1;
            return Ok(byte);
        }
        if self.pos == 0 {
            let byte = self.get_byte(self.index)?;
            self.pos = 8;
            return Ok(byte);
        }

        let head = self.get_byte(self.index)?;
        let tail = self.get_byte(self.index + 1)?;
        self.index += 1;

        Ok((head << self.pos) | (tail >> (8 - self.pos)))
    }

    pub fn read_bits(&mut self, num: u32) -> Result<u64> {
        let mut num = num.min(64);

        let mut bits: u64 = 0;
        while num >= 8 {
            let byte = self.read_byte()? as u64;
            bits = (bits << 8) | byte;
            num -= 8;
        }

        while num > 0 {
            let bit = self.read_bit()?;
            bits = (bits << 1) | bit.to_u64();
            num -= 1;
        }

        Ok(bits)
    }

    pub fn read_uvarint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_LEN64 {
            let b = self.read_byte()?;
            if b < 0x80 {
                if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                    break;
                }
                return Ok(value | (b as u64) << shift);
            }
            value |= ((b & 0x7f) as u64) << shift;
            shift += 7;
        }

        Err(Error::Corrupted("bit stream: uvarint overflows 64 bits".to_string()))
    }

    pub fn read_varint(&mut self) -> Result<i64> {
        self.read_uvarint().map(zig_zag_decode)
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::bit::{Bit, BitReader, BitWriter};

    #[test]
    fn test_bits_round_trip() {
        let mut w = BitWriter::new();
        w.write_bit(Bit::One);
        w.write_bits(0b101, 3);
        w.write_byte(0xAB);
        w.write_bits(u64::MAX, 64);
        w.write_bits(0x3FFF, 14);
        w.write_bit(Bit::Zero);

        let data = w.into_inner();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bit().unwrap(), Bit::One);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_byte().unwrap(), 0xAB);
        assert_eq!(r.read_bits(64).unwrap(), u64::MAX);
        assert_eq!(r.read_bits(14).unwrap(), 0x3FFF);
        assert_eq!(r.read_bit().unwrap(), Bit::Zero);
    }

    #[test]
    fn test_byte_aligned_layout() {
        let mut w = BitWriter::new();
        w.write_byte(0x12);
        w.write_bits(0x3456, 16);
        assert_eq!(w.as_slice(), &[0x12, 0x34, 0x56]);

        let mut r = BitReader::new(w.as_slice());
        assert_eq!(r.read_byte().unwrap(), 0x12);
        assert_eq!(r.read_byte().unwrap(), 0x34);
        assert_eq!(r.read_byte().unwrap(), 0x56);
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn test_unaligned_varints() {
        let mut w = BitWriter::new();
        w.write_bit(Bit::One);
        w.write_varint(-1_700_000_000_000);
        w.write_uvarint(15_000);

        let data = w.into_inner();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bit().unwrap(), Bit::One);
        assert_eq!(r.read_varint().unwrap(), -1_700_000_000_000);
        assert_eq!(r.read_uvarint().unwrap(), 15_000);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xFF_u8];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(8).unwrap(), 0xFF);
        assert!(r.read_bit().is_err());
        assert!(r.read_byte().is_err());
    }
}
