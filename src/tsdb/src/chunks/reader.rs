use std::path::Path;

use bytes::{Buf, Bytes};
use historygen_storage::mmap::MmapReadableFile;
use historygen_storage::{RandomAccessFile, RandomAccessFileExt};

use crate::chunks::{
    parse_segment_file_name, ChunkRef, CHUNKS_FORMAT_V1, CHUNK_CRC_SIZE, MAGIC_CHUNKS,
    SEGMENT_HEADER,
};
use crate::codec::varint::{get_uvarint, MAX_VARINT_LEN64};
use crate::error::{Error, Result};

/// ChunkReader resolves chunk references against the segment files of a `chunks/` directory.
pub struct ChunkReader {
    segments: Vec<MmapReadableFile>,
}

impl ChunkReader {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let mut indexes = vec![];
        let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(index) = file_name.to_str().and_then(parse_segment_file_name) {
                indexes.push((index, entry.path()));
            }
        }
        indexes.sort_by_key(|(index, _)| *index);

        let mut segments = Vec::with_capacity(indexes.len());
        for (i, (index, path)) in indexes.into_iter().enumerate() {
            if index as usize != i {
                return Err(Error::Corrupted(format!(
                    "segment {} found where segment {} is expected",
                    index, i
                )));
            }

            let f = MmapReadableFile::open(&path).await?;
            Self::check_header(&f, index).await?;
            segments.push(f);
        }

        Ok(Self { segments })
    }

    async fn check_header(f: &MmapReadableFile, index: u32) -> Result<()> {
        if f.size() < SEGMENT_HEADER.len() as u64 {
            return Err(Error::Corrupted(format!(
                "segment {} is smaller than its header",
                index
            )));
        }

        let magic = f.read_u32(0).await?;
        if magic != MAGIC_CHUNKS {
            return Err(Error::Corrupted(format!(
                "segment {} has invalid magic number {:x}",
                index, magic
            )));
        }
        let version = f.read_u8(4).await?;
        if version != CHUNKS_FORMAT_V1 {
            return Err(Error::Corrupted(format!(
                "segment {} has unsupported version {}",
                index, version
            )));
        }
        Ok(())
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// chunk returns the encoding and payload of the referenced chunk, after verifying its CRC.
    pub async fn chunk(&self, reference: ChunkRef) -> Result<(u8, Bytes)> {
        let (segment, offset) = reference.split();
        let f = self
            .segments
            .get(segment as usize)
            .ok_or_else(|| Error::Corrupted(format!("chunk {}: no such segment", reference)))?;

        let offset = offset as u64;
        let head = f.read_vec(offset, MAX_VARINT_LEN64 + 1).await?;
        let mut buf = head.as_slice();
        let len = get_uvarint(&mut buf)? as usize;
        if !buf.has_remaining() {
            return Err(Error::Corrupted(format!(
                "chunk {}: missing encoding",
                reference
            )));
        }
        let varint_len = head.len() - buf.remaining();

        // encoding byte, data and crc
        let mut frame = vec![0_u8; 1 + len + CHUNK_CRC_SIZE];
        f.read(offset + varint_len as u64, &mut frame).await?;

        let (body, crc) = frame.split_at(1 + len);
        let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let actual = crc32c::crc32c(body);
        if actual != expected {
            return Err(Error::Corrupted(format!(
                "chunk {}: checksum mismatch, expected {:x} got {:x}",
                reference, expected, actual
            )));
        }

        Ok((body[0], Bytes::copy_from_slice(&body[1..])))
    }

    pub async fn close(self) -> Result<()> {
        for f in self.segments {
            f.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::chunks::reader::ChunkReader;
    use crate::chunks::writer::ChunkWriter;
    use crate::chunks::{ChunkMeta, ChunkRef};
    use crate::codec::ENCODING_XOR;

    #[tokio::test]
    async fn test_read_written_chunks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let big = vec![7_u8; 300];
        let chunks = vec![
            ChunkMeta {
                min_time: 0,
                max_time: 1,
                num_samples: 1,
                reference: ChunkRef::join(0, 8),
                encoding: ENCODING_XOR,
                data: Bytes::from_static(b"first"),
            },
            ChunkMeta {
                min_time: 1,
                max_time: 2,
                num_samples: 1,
                reference: ChunkRef::join(0, 20),
                encoding: ENCODING_XOR,
                data: Bytes::from(big.clone()),
            },
        ];

        let mut w = ChunkWriter::new(dir.path()).await?;
        w.write_chunks(&chunks).await?;
        w.close().await?;

        let r = ChunkReader::open(dir.path()).await?;
        assert_eq!(r.num_segments(), 1);

        let (encoding, data) = r.chunk(ChunkRef::join(0, 8)).await?;
        assert_eq!(encoding, ENCODING_XOR);
        assert_eq!(data.as_ref(), b"first");

        let (_, data) = r.chunk(ChunkRef::join(0, 20)).await?;
        assert_eq!(data.as_ref(), big.as_slice());

        assert!(r.chunk(ChunkRef::join(1, 8)).await.is_err());
        r.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_detects_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut w = ChunkWriter::new(dir.path()).await?;
        w.write_chunks(&[ChunkMeta {
            min_time: 0,
            max_time: 1,
            num_samples: 1,
            reference: ChunkRef::join(0, 8),
            encoding: ENCODING_XOR,
            data: Bytes::from_static(b"payload"),
        }])
        .await?;
        w.close().await?;

        let path = dir.path().join("000001");
        let mut data = tokio::fs::read(&path).await?;
        data[12] ^= 0xff;
        tokio::fs::write(&path, &data).await?;

        let r = ChunkReader::open(dir.path()).await?;
        assert!(r.chunk(ChunkRef::join(0, 8)).await.is_err());
        r.close().await?;

        data[0] = 0;
        tokio::fs::write(&path, &data).await?;
        assert!(ChunkReader::open(dir.path()).await.is_err());
        Ok(())
    }
}
