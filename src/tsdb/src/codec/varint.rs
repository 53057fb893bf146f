//! Variable-length integers in the layout used by Go's `encoding/binary`: seven bits per byte,
//! least significant group first, high bit set on every byte but the last. Signed values are
//! zig-zag mapped first.

use bytes::{Buf, BufMut};

use crate::codec::zigzag::{zig_zag_decode, zig_zag_encode};
use crate::error::{Error, Result};

/// MAX_VARINT_LEN64 is the maximum length of a varint-encoded 64-bit integer.
pub const MAX_VARINT_LEN64: usize = 10;

/// uvarint_len returns the number of bytes `v` occupies as a uvarint.
pub fn uvarint_len(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

pub fn put_uvarint(buf: &mut impl BufMut, mut v: u64) {
    while v >= 0x80 {
        buf.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    buf.put_u8(v as u8);
}

pub fn put_varint(buf: &mut impl BufMut, v: i64) {
    put_uvarint(buf, zig_zag_encode(v));
}

/// put_uvarint_str writes a length-prefixed string.
pub fn put_uvarint_str(buf: &mut impl BufMut, s: &str) {
    put_uvarint(buf, s.len() as u64);
    buf.put_slice(s.as_bytes());
}

pub fn get_uvarint(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    for i in 0..MAX_VARINT_LEN64 {
        if !buf.has_remaining() {
            return Err(Error::Corrupted("uvarint: unexpected end of data".to_string()));
        }
        let b = buf.get_u8();
        if b < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                break;
            }
            return Ok(value | (b as u64) << shift);
        }
        value |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(Error::Corrupted("uvarint: overflows 64 bits".to_string()))
}

pub fn get_varint(buf: &mut impl Buf) -> Result<i64> {
    get_uvarint(buf).map(zig_zag_decode)
}

pub fn get_uvarint_str(buf: &mut impl Buf) -> Result<String> {
    let len = get_uvarint(buf)? as usize;
    if buf.remaining() < len {
        return Err(Error::Corrupted(format!(
            "string of {} bytes exceeds remaining {}",
            len,
            buf.remaining()
        )));
    }
    let mut s = vec![0_u8; len];
    buf.copy_to_slice(&mut s);
    String::from_utf8(s).map_err(|e| Error::Corrupted(e.to_string()))
}
