//! The index file of a block, in the Prometheus index format version 2.
//!
//! ┌────────────────────────────┬─────────────────────┐
//! │ magic(0xBAAAD700) <4b>     │ version(2) <1 byte> │
//! ├────────────────────────────┴─────────────────────┤
//! │ ┌──────────────────────────────────────────────┐ │
//! │ │                 Symbol Table                 │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                    Series                    │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                 Label Index 1                │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                      ...                     │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                  Postings 1                  │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                      ...                     │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │               Label Index Table              │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                 Postings Table               │ │
//! │ ├──────────────────────────────────────────────┤ │
//! │ │                      TOC                     │ │
//! │ └──────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────┘
//!
//! Every section except the series entries and the TOC is `len <4b> | body | CRC32 <4b>`, the
//! CRC32 (Castagnoli) covering the body only. Strings in series and label index sections are
//! referenced by their position in the sorted symbol table.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

pub mod builder;
pub mod postings;
pub mod reader;
pub mod writer;

pub const MAGIC_INDEX: u32 = 0xBAAAD700;

pub const INDEX_FORMAT_V2: u8 = 2;

/// Size of the magic number and version in front of the symbol table.
pub const HEADER_LEN: usize = 5;

/// Series entries start at multiples of this, and are referenced by `offset / SERIES_ALIGNMENT`.
pub const SERIES_ALIGNMENT: u64 = 16;

/// Label indices and postings lists start at multiples of this.
pub const SECTION_ALIGNMENT: u64 = 4;

/// Size of the TOC at the end of the file: six offsets and a CRC32.
pub const TOC_LEN: usize = 6 * 8 + 4;

/// Toc holds the offsets of the index sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toc {
    pub symbols: u64,
    pub series: u64,
    pub label_indices: u64,
    pub label_indices_table: u64,
    pub postings: u64,
    pub postings_table: u64,
}

impl Toc {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(TOC_LEN);
        b.put_u64(self.symbols);
        b.put_u64(self.series);
        b.put_u64(self.label_indices);
        b.put_u64(self.label_indices_table);
        b.put_u64(self.postings);
        b.put_u64(self.postings_table);
        let crc = crc32c::crc32c(&b);
        b.put_u32(crc);
        b
    }

    /// decode reads the TOC from the last `TOC_LEN` bytes of `index`.
    pub fn decode(index: &[u8]) -> Result<Self> {
        if index.len() < HEADER_LEN + TOC_LEN {
            return Err(Error::Corrupted(format!(
                "index of {} bytes is too small for a TOC",
                index.len()
            )));
        }

        let b = &index[index.len() - TOC_LEN..];
        let (body, crc) = b.split_at(TOC_LEN - 4);
        let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32c::crc32c(body) != expected {
            return Err(Error::Corrupted("index TOC checksum mismatch".to_string()));
        }

        let mut body = body;
        Ok(Self {
            symbols: body.get_u64(),
            series: body.get_u64(),
            label_indices: body.get_u64(),
            label_indices_table: body.get_u64(),
            postings: body.get_u64(),
            postings_table: body.get_u64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::index::{Toc, HEADER_LEN, TOC_LEN};

    #[test]
    fn test_toc_encode_decode() {
        let toc = Toc {
            symbols: 5,
            series: 64,
            label_indices: 256,
            label_indices_table: 300,
            postings: 280,
            postings_table: 340,
        };

        let mut file = vec![0_u8; HEADER_LEN];
        file.extend_from_slice(&toc.encode());
        assert_eq!(file.len(), HEADER_LEN + TOC_LEN);
        assert_eq!(Toc::decode(&file).unwrap(), toc);

        file[HEADER_LEN + 3] ^= 1;
        assert!(Toc::decode(&file).is_err());
    }
}
