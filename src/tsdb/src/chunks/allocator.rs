use tracing::debug;

use crate::chunks::{ChunkMeta, ChunkRef, EncodedChunk};
use crate::error::{Error, Result};
use crate::options::FormatOptions;

/// SegmentAllocator hands out segment positions for the chunks of one block.
///
/// Chunks are laid out back to back in the order they are placed. When a chunk would cross the
/// segment's capacity the current segment is sealed and the chunk starts a new one right after
/// its header; a chunk is never split over two segments.
#[derive(Debug)]
pub struct SegmentAllocator {
    segment: u32,
    cursor: u64,

    header_size: u64,
    max_segment_size: u64,
    chunk_overhead_size: usize,
}

impl SegmentAllocator {
    pub fn new(format: &FormatOptions) -> Self {
        Self {
            segment: 0,
            cursor: format.segment_header_size,
            header_size: format.segment_header_size,
            max_segment_size: format.max_segment_size,
            chunk_overhead_size: format.chunk_overhead_size,
        }
    }

    /// allocate reserves `size` bytes and returns the reference of their first byte.
    pub fn allocate(&mut self, size: u64) -> Result<ChunkRef> {
        if self.header_size + size > self.max_segment_size {
            return Err(Error::Format(format!(
                "a {} byte chunk can not fit any {} byte segment",
                size, self.max_segment_size
            )));
        }

        // Reference a new segment if the current is out of space.
        if self.cursor + size > self.max_segment_size {
            debug!(
                segment = self.segment,
                size = self.cursor,
                "segment full, rolling over"
            );
            self.segment = self
                .segment
                .checked_add(1)
                .ok_or_else(|| Error::Format("segment index overflows 32 bits".to_string()))?;
            self.cursor = self.header_size;
        }

        let reference = ChunkRef::join(self.segment, self.cursor as u32);
        self.cursor += size;

        Ok(reference)
    }

    /// place assigns the chunk its reference.
    pub fn place(&mut self, chunk: EncodedChunk) -> Result<ChunkMeta> {
        let size = chunk.size(self.chunk_overhead_size) as u64;
        let reference = self.allocate(size)?;
        Ok(ChunkMeta::place(chunk, reference))
    }

    /// position returns the current segment index and the next free offset in it.
    pub fn position(&self) -> (u32, u64) {
        (self.segment, self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use crate::chunks::allocator::SegmentAllocator;
    use crate::chunks::ChunkRef;
    use crate::options::FormatOptions;

    fn format(max_segment_size: u64) -> FormatOptions {
        FormatOptions {
            max_segment_size,
            max_chunk_size: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_allocate_starts_after_header() {
        let mut a = SegmentAllocator::new(&FormatOptions::default());
        assert_eq!(a.allocate(100).unwrap(), ChunkRef::join(0, 8));
        assert_eq!(a.allocate(50).unwrap(), ChunkRef::join(0, 108));
        assert_eq!(a.position(), (0, 158));
    }

    #[test]
    fn test_allocate_rolls_over() {
        let mut a = SegmentAllocator::new(&format(100));
        assert_eq!(a.allocate(60).unwrap(), ChunkRef::join(0, 8));
        // 68 + 32 == 100 still fits exactly
        assert_eq!(a.allocate(32).unwrap(), ChunkRef::join(0, 68));
        assert_eq!(a.allocate(1).unwrap(), ChunkRef::join(1, 8));
        assert_eq!(a.allocate(92).unwrap(), ChunkRef::join(2, 8));
        assert_eq!(a.position(), (2, 100));
    }

    #[test]
    fn test_allocate_oversized() {
        let mut a = SegmentAllocator::new(&format(100));
        assert!(a.allocate(93).is_err());
    }

    quickcheck! {
        fn prop_references_fit_and_increase(sizes: Vec<u8>) -> bool {
            let max_segment_size = 300;
            let mut a = SegmentAllocator::new(&format(max_segment_size));
            let mut last: Option<ChunkRef> = None;

            for size in sizes {
                let size = size as u64 + 1;
                let r = a.allocate(size).unwrap();
                let (segment, offset) = r.split();

                if offset < 8 || offset as u64 + size > max_segment_size {
                    return false;
                }
                if let Some(last) = last {
                    if r <= last || segment > last.segment() + 1 {
                        return false;
                    }
                }
                last = Some(r);
            }
            true
        }
    }
}
