//! XOR chunk encoding for float samples.
//!
//! ┌──────────────────┬──────────────────────┬──────────────────────┬────────────────────────┐
//! │ num samples <2b> │ t_0 <varint>         │ t_1 - t_0 <uvarint>  │ dod_n <0|14|17|20|64b> │
//! │                  │ v_0 <64 bits>        │ v_1 <xor>            │ v_n <xor>              │
//! └──────────────────┴──────────────────────┴──────────────────────┴────────────────────────┘
//!
//! Timestamps after the second are stored as delta-of-deltas behind a variable-length prefix,
//! values as the XOR against the previous value, as presented in:
//! http://www.vldb.org/pvldb/vol8/p1816-teller.pdf.

use crate::codec::bit::Bit::{One, Zero};
use crate::codec::bit::{BitReader, BitWriter};
use crate::codec::{Appender, ENCODING_XOR};
use crate::error::{Error, Result};

/// Size of the sample count header in front of the bit stream.
const XOR_HEADER_SIZE: usize = 2;

/// Sentinel marking that no leading/trailing window has been established yet.
const NO_WINDOW: u8 = 0xff;

/// bit_range reports whether `x` can be stored in `nbits` bits by the dod encoding.
fn bit_range(x: i64, nbits: u8) -> bool {
    -((1 << (nbits - 1)) - 1) <= x && x <= 1 << (nbits - 1)
}

/// XorChunk encodes float samples with delta-of-delta timestamps and XOR'd values.
#[derive(Debug, Clone)]
pub struct XorChunk {
    num: u16,
    bw: BitWriter,

    t: i64,
    v: f64,
    t_delta: u64,

    leading: u8,
    trailing: u8,
}

impl Default for XorChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl XorChunk {
    pub fn new() -> Self {
        Self {
            num: 0,
            bw: BitWriter::with_capacity(128),
            t: 0,
            v: 0.0,
            t_delta: 0,
            leading: NO_WINDOW,
            trailing: 0,
        }
    }

    fn write_v_delta(&mut self, v: f64) {
        let v_delta = v.to_bits() ^ self.v.to_bits();

        if v_delta == 0 {
            self.bw.write_bit(Zero);
            return;
        }
        self.bw.write_bit(One);

        let mut leading = v_delta.leading_zeros() as u8;
        let trailing = v_delta.trailing_zeros() as u8;

        // Clamp number of leading zeros to avoid overflow when encoding.
        if leading >= 32 {
            leading = 31;
        }

        if self.leading != NO_WINDOW && leading >= self.leading && trailing >= self.trailing {
            self.bw.write_bit(Zero);
            self.bw.write_bits(
                v_delta >> self.trailing,
                64 - self.leading as u32 - self.trailing as u32,
            );
        } else {
            self.leading = leading;
            self.trailing = trailing;

            self.bw.write_bit(One);
            self.bw.write_bits(leading as u64, 5);

            // 64 significant bits does not fit the 6 bit field and is written as 0; it is
            // restored on read since 0 significant bits never occur here.
            let sigbits = 64 - leading as u32 - trailing as u32;
            self.bw.write_bits(sigbits as u64, 6);
            self.bw.write_bits(v_delta >> trailing, sigbits);
        }
    }
}

impl Appender for XorChunk {
    fn append(&mut self, t: i64, v: f64) -> Result<()> {
        if self.num == u16::MAX {
            return Err(Error::Format(format!(
                "xor chunk is full with {} samples",
                self.num
            )));
        }

        let mut t_delta = 0_u64;
        match self.num {
            0 => {
                self.bw.write_varint(t);
                self.bw.write_bits(v.to_bits(), 64);
            }
            1 => {
                t_delta = t.wrapping_sub(self.t) as u64;
                self.bw.write_uvarint(t_delta);
                self.write_v_delta(v);
            }
            _ => {
                t_delta = t.wrapping_sub(self.t) as u64;
                let dod = t_delta.wrapping_sub(self.t_delta) as i64;

                if dod == 0 {
                    self.bw.write_bit(Zero);
                } else if bit_range(dod, 14) {
                    self.bw.write_bits(0b10, 2);
                    self.bw.write_bits(dod as u64, 14);
                } else if bit_range(dod, 17) {
                    self.bw.write_bits(0b110, 3);
                    self.bw.write_bits(dod as u64, 17);
                } else if bit_range(dod, 20) {
                    self.bw.write_bits(0b1110, 4);
                    self.bw.write_bits(dod as u64, 20);
                } else {
                    self.bw.write_bits(0b1111, 4);
                    self.bw.write_bits(dod as u64, 64);
                }

                self.write_v_delta(v);
            }
        }

        self.t = t;
        self.v = v;
        self.t_delta = t_delta;
        self.num += 1;

        Ok(())
    }

    fn num_samples(&self) -> usize {
        self.num as usize
    }

    fn encoding(&self) -> u8 {
        ENCODING_XOR
    }

    fn bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(XOR_HEADER_SIZE + self.bw.len());
        b.extend_from_slice(&self.num.to_be_bytes());
        b.extend_from_slice(self.bw.as_slice());
        b
    }
}

/// XorIterator decodes the samples of an encoded XOR chunk.
pub struct XorIterator<'a> {
    br: BitReader<'a>,
    num_total: u16,
    num_read: u16,

    t: i64,
    v: f64,
    t_delta: u64,

    leading: u8,
    trailing: u8,
}

impl<'a> XorIterator<'a> {
    pub fn new(b: &'a [u8]) -> Result<Self> {
        if b.len() < XOR_HEADER_SIZE {
            return Err(Error::Corrupted(format!(
                "xor chunk of {} bytes has no header",
                b.len()
            )));
        }

        Ok(Self {
            br: BitReader::new(&b[XOR_HEADER_SIZE..]),
            num_total: u16::from_be_bytes([b[0], b[1]]),
            num_read: 0,
            t: 0,
            v: 0.0,
            t_delta: 0,
            leading: 0,
            trailing: 0,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.num_total as usize
    }

    fn read_value(&mut self) -> Result<()> {
        if self.br.read_bit()? == Zero {
            return Ok(());
        }

        if self.br.read_bit()? == One {
            self.leading = self.br.read_bits(5)? as u8;
            let mut mbits = self.br.read_bits(6)? as u8;
            if mbits == 0 {
                mbits = 64;
            }
            if self.leading as u32 + mbits as u32 > 64 {
                return Err(Error::Corrupted(format!(
                    "xor window {} + {} exceeds 64 bits",
                    self.leading, mbits
                )));
            }
            self.trailing = 64 - self.leading - mbits;
        }

        let mbits = 64 - self.leading as u32 - self.trailing as u32;
        let bits = self.br.read_bits(mbits)?;
        let v_bits = self.v.to_bits() ^ (bits << self.trailing);
        self.v = f64::from_bits(v_bits);

        Ok(())
    }

    fn read_dod(&mut self) -> Result<i64> {
        let mut d = 0_u8;
        for _ in 0..4 {
            d <<= 1;
            if self.br.read_bit()? == Zero {
                break;
            }
            d |= 1;
        }

        let sz = match d {
            0b0 => return Ok(0),
            0b10 => 14,
            0b110 => 17,
            0b1110 => 20,
            0b1111 => return Ok(self.br.read_bits(64)? as i64),
            _ => unreachable!("prefix has at most four bits"),
        };

        let mut bits = self.br.read_bits(sz)? as i64;
        if bits > 1 << (sz - 1) {
            bits -= 1 << sz;
        }
        Ok(bits)
    }

    fn next_sample(&mut self) -> Result<(i64, f64)> {
        match self.num_read {
            0 => {
                self.t = self.br.read_varint()?;
                self.v = f64::from_bits(self.br.read_bits(64)?);
            }
            1 => {
                self.t_delta = self.br.read_uvarint()?;
                self.t = self.t.wrapping_add(self.t_delta as i64);
                self.read_value()?;
            }
            _ => {
                let dod = self.read_dod()?;
                self.t_delta = (self.t_delta as i64).wrapping_add(dod) as u64;
                self.t = self.t.wrapping_add(self.t_delta as i64);
                self.read_value()?;
            }
        }

        self.num_read += 1;
        Ok((self.t, self.v))
    }
}

impl<'a> Iterator for XorIterator<'a> {
    type Item = Result<(i64, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_read >= self.num_total {
            return None;
        }

        let sample = self.next_sample();
        if sample.is_err() {
            // stop after the first error
            self.num_read = self.num_total;
        }
        Some(sample)
    }
}

/// decode_xor_chunk decodes every sample of an encoded XOR chunk.
pub fn decode_xor_chunk(b: &[u8]) -> Result<Vec<(i64, f64)>> {
    let itr = XorIterator::new(b)?;
    let mut samples = Vec::with_capacity(itr.num_samples());
    for sample in itr {
        samples.push(sample?);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use crate::codec::xor::{bit_range, decode_xor_chunk, XorChunk};
    use crate::codec::{Appender, ENCODING_XOR};

    fn encode(samples: &[(i64, f64)]) -> Vec<u8> {
        let mut c = XorChunk::new();
        for (t, v) in samples {
            c.append(*t, *v).unwrap();
        }
        assert_eq!(c.num_samples(), samples.len());
        c.bytes()
    }

    fn regular_samples(n: usize) -> Vec<(i64, f64)> {
        let start = 1_600_000_000_000_i64;
        (0..n)
            .map(|i| (start + i as i64 * 15_000, (i * 15) as f64))
            .collect()
    }

    #[test]
    fn test_bit_range() {
        assert!(bit_range(0, 14));
        assert!(bit_range(8192, 14));
        assert!(!bit_range(8193, 14));
        assert!(bit_range(-8191, 14));
        assert!(!bit_range(-8192, 14));
    }

    #[test]
    fn test_round_trip_boundary_counts() {
        for n in [0, 1, 119, 120] {
            let samples = regular_samples(n);
            let b = encode(&samples);
            assert_eq!(u16::from_be_bytes([b[0], b[1]]) as usize, n);
            assert_eq!(decode_xor_chunk(&b).unwrap(), samples, "count {}", n);
        }
    }

    #[test]
    fn test_round_trip_irregular() {
        let samples = vec![
            (-5_000, 1.5),
            (0, -2.25),
            (1, -2.25),
            (9_000, f64::MAX),
            (9_001, f64::MIN_POSITIVE),
            (200_000, 0.0),
            (200_000 + (1 << 18), 1e300),
            (i64::MAX / 2, -0.0),
            (i64::MAX / 2 + 7, 42.0),
        ];
        let b = encode(&samples);
        let decoded = decode_xor_chunk(&b).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for ((t, v), (dt, dv)) in samples.iter().zip(decoded.iter()) {
            assert_eq!(t, dt);
            assert_eq!(v.to_bits(), dv.to_bits());
        }
    }

    #[test]
    fn test_regular_series_is_compact() {
        // a raw sample is 16 bytes
        let b = encode(&regular_samples(120));
        assert!(b.len() < 120 * 8, "encoded {} bytes", b.len());
    }

    #[test]
    fn test_truncated_chunk() {
        let b = encode(&regular_samples(10));
        assert!(decode_xor_chunk(&b[..b.len() / 2]).is_err());
        assert!(decode_xor_chunk(&b[..1]).is_err());
    }

    #[test]
    fn test_encoding() {
        assert_eq!(XorChunk::new().encoding(), ENCODING_XOR);
    }
}
