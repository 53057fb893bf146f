//! Chunks are written to segment files under a block's `chunks/` directory.
//!
//! A segment file is an 8 byte header followed by chunk frames placed back to back.
//!
//! ┌──────────────────────────────┬──────────────────┬───────────────┐
//! │ magic(0x85BD40DD) <4 byte>   │ version <1 byte> │ pad <3 byte>  │
//! └──────────────────────────────┴──────────────────┴───────────────┘
//!
//! ┌───────────────┬───────────────────┬─────────────┬────────────────┐
//! │ len <uvarint> │ encoding <1 byte> │ data <len>  │ CRC32 <4 byte> │
//! └───────────────┴───────────────────┴─────────────┴────────────────┘
//!
//! The CRC32 (Castagnoli) covers the encoding byte and the data. A chunk is addressed by a
//! `ChunkRef` packing the segment index into the upper 32 bits and the frame's byte offset
//! within the segment file into the lower 32 bits. Segment index `i` is stored in the file
//! named `format!("{:06}", i + 1)`.

use std::fmt::{Debug, Display, Formatter};

use bytes::Bytes;
use regex::Regex;

pub mod allocator;
pub mod builder;
pub mod reader;
pub mod writer;

/// MAGIC_CHUNKS is written as the first 4 bytes of a segment file.
pub const MAGIC_CHUNKS: u32 = 0x85BD40DD;

/// CHUNKS_FORMAT_V1 is the version of the segment file format.
pub const CHUNKS_FORMAT_V1: u8 = 1;

/// Segment header: | magic number(4B) | version(1B) | padding(3B) |
pub const SEGMENT_HEADER: [u8; 8] = [0x85, 0xBD, 0x40, 0xDD, CHUNKS_FORMAT_V1, 0, 0, 0];

/// Size in bytes of the CRC32 closing every chunk frame.
pub const CHUNK_CRC_SIZE: usize = 4;

/// ChunkRef locates a chunk: the segment index in the upper 32 bits, the byte offset inside
/// that segment in the lower 32 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChunkRef(u64);

impl ChunkRef {
    pub fn join(segment: u32, offset: u32) -> Self {
        ChunkRef(((segment as u64) << 32) | (offset as u64))
    }

    pub fn split(&self) -> (u32, u32) {
        (self.segment(), self.offset())
    }

    pub fn segment(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(&self) -> u32 {
        (self.0 & 0xFFFFFFFF) as u32
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ChunkRef {
    fn from(v: u64) -> Self {
        ChunkRef(v)
    }
}

impl Debug for ChunkRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.segment(), self.offset())
    }
}

impl Display for ChunkRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// EncodedChunk is a chunk payload that has not been placed in a segment yet.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub min_time: i64,
    pub max_time: i64,
    pub num_samples: usize,
    pub encoding: u8,
    pub data: Bytes,
}

impl EncodedChunk {
    /// size returns the bytes the chunk takes in a segment, given the fixed per-chunk overhead.
    pub fn size(&self, overhead: usize) -> usize {
        self.data.len() + overhead
    }
}

/// ChunkMeta is a chunk placed in a segment.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub min_time: i64,
    pub max_time: i64,
    pub num_samples: usize,
    pub reference: ChunkRef,
    pub encoding: u8,
    pub data: Bytes,
}

impl ChunkMeta {
    pub fn place(chunk: EncodedChunk, reference: ChunkRef) -> Self {
        let EncodedChunk {
            min_time,
            max_time,
            num_samples,
            encoding,
            data,
        } = chunk;

        Self {
            min_time,
            max_time,
            num_samples,
            reference,
            encoding,
            data,
        }
    }
}

/// segment_file_name returns the file name holding segment `index`.
pub fn segment_file_name(index: u32) -> String {
    format!("{:06}", index as u64 + 1)
}

/// parse_segment_file_name returns the segment index stored in the named file.
pub fn parse_segment_file_name(filename: &str) -> Option<u32> {
    if !is_valid_segment_file_name(filename) {
        return None;
    }
    let n: u64 = filename.parse().ok()?;
    n.checked_sub(1).and_then(|i| u32::try_from(i).ok())
}

/// is_valid_segment_file_name returns true if filename is a 6-or-more digit decimal number.
pub fn is_valid_segment_file_name(filename: &str) -> bool {
    lazy_static! {
        static ref RE: Regex = Regex::new("^[0-9]{6,}$").unwrap();
    }

    RE.is_match(filename)
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use crate::chunks::{
        is_valid_segment_file_name, parse_segment_file_name, segment_file_name, ChunkRef,
        MAGIC_CHUNKS, SEGMENT_HEADER,
    };

    #[test]
    fn test_segment_header() {
        assert_eq!(&SEGMENT_HEADER[..4], &MAGIC_CHUNKS.to_be_bytes());
        assert_eq!(SEGMENT_HEADER[4], 1);
    }

    #[test]
    fn test_segment_file_name() {
        assert_eq!(segment_file_name(0), "000001");
        assert_eq!(segment_file_name(41), "000042");
        assert_eq!(parse_segment_file_name("000001"), Some(0));
        assert_eq!(parse_segment_file_name("000042"), Some(41));
        assert_eq!(parse_segment_file_name("000000"), None);
        assert!(!is_valid_segment_file_name("00001"));
        assert!(!is_valid_segment_file_name("00000a"));
        assert!(!is_valid_segment_file_name("index"));
    }

    quickcheck! {
        fn prop_chunk_ref_split(segment: u32, offset: u32) -> bool {
            let r = ChunkRef::join(segment, offset);
            r.split() == (segment, offset)
                && (r.as_u64() & 0xFFFFFFFF) as u32 == offset
                && (r.as_u64() >> 32) as u32 == segment
        }
    }
}
