use std::path::{Path, PathBuf};

use historygen_storage::file::WritableFile;
use historygen_storage::Writable;
use tracing::debug;

use crate::chunks::{segment_file_name, ChunkMeta, SEGMENT_HEADER};
use crate::codec::varint::{put_uvarint, MAX_VARINT_LEN64};
use crate::error::{Error, Result};

/// ChunkWriter persists placed chunks into the segment files of a `chunks/` directory.
///
/// Each chunk is written at the exact position its reference names, so the writer follows
/// whatever layout the allocator decided. A segment file is created when its first chunk
/// arrives; the previous one is synced and closed at that point.
pub struct ChunkWriter {
    dir: PathBuf,

    segment: Option<u32>,
    wf: Option<WritableFile>,
}

impl ChunkWriter {
    /// new creates the chunks directory if missing. No segment file is created until the first
    /// chunk is written.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            segment: None,
            wf: None,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// write_chunks writes the chunks of one series, in order.
    pub async fn write_chunks(&mut self, chunks: &[ChunkMeta]) -> Result<()> {
        for chunk in chunks {
            self.write_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &ChunkMeta) -> Result<()> {
        let (segment, offset) = chunk.reference.split();

        if self.segment != Some(segment) {
            self.cut(segment).await?;
        }
        let wf = match self.wf.as_mut() {
            Some(wf) => wf,
            None => return Err(Error::Format("no open segment file".to_string())),
        };

        let offset = offset as u64;
        if offset < wf.size() {
            return Err(Error::Format(format!(
                "chunk {} overlaps segment data ending at {}",
                chunk.reference,
                wf.size()
            )));
        }
        wf.pad_to(offset).await?;

        let mut head = Vec::with_capacity(MAX_VARINT_LEN64 + 1);
        put_uvarint(&mut head, chunk.data.len() as u64);
        head.push(chunk.encoding);

        let crc = crc32c::crc32c_append(crc32c::crc32c(&[chunk.encoding]), &chunk.data);

        wf.append(&head).await?;
        wf.append(&chunk.data).await?;
        wf.append(&crc.to_be_bytes()).await?;

        Ok(())
    }

    /// cut seals the current segment file and starts the file of `segment`.
    async fn cut(&mut self, segment: u32) -> Result<()> {
        let expected = match self.segment {
            Some(current) => current.checked_add(1),
            None => Some(0),
        };
        if expected != Some(segment) {
            return Err(Error::Format(format!(
                "segment {} does not follow segment {:?}",
                segment, self.segment
            )));
        }

        self.finalize_tail().await?;

        let path = self.dir.join(segment_file_name(segment));
        let mut wf = WritableFile::create(&path).await?;
        wf.append(&SEGMENT_HEADER).await?;
        debug!(segment, path = %path.display(), "cut new segment file");

        self.segment = Some(segment);
        self.wf = Some(wf);
        Ok(())
    }

    async fn finalize_tail(&mut self) -> Result<()> {
        if let Some(wf) = self.wf.take() {
            let size = wf.size();
            wf.close().await?;
            debug!(segment = ?self.segment, size, "sealed segment file");
        }
        Ok(())
    }

    /// close flushes and syncs the last segment file.
    pub async fn close(mut self) -> Result<()> {
        self.finalize_tail().await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::chunks::writer::ChunkWriter;
    use crate::chunks::{ChunkMeta, ChunkRef, SEGMENT_HEADER};
    use crate::codec::ENCODING_XOR;

    fn meta(reference: ChunkRef, data: &'static [u8]) -> ChunkMeta {
        ChunkMeta {
            min_time: 0,
            max_time: 1,
            num_samples: 1,
            reference,
            encoding: ENCODING_XOR,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_write_chunks_at_references() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let chunks_dir = dir.path().join("chunks");

        let mut w = ChunkWriter::new(&chunks_dir).await?;
        // 3 byte payloads take 1 + 1 + 3 + 4 = 9 bytes, allocated as 3 + 7 = 10
        w.write_chunks(&[
            meta(ChunkRef::join(0, 8), b"abc"),
            meta(ChunkRef::join(0, 18), b"def"),
        ])
        .await?;
        w.write_chunks(&[meta(ChunkRef::join(1, 8), b"xyz")]).await?;
        w.close().await?;

        let seg0 = tokio::fs::read(chunks_dir.join("000001")).await?;
        assert_eq!(&seg0[..8], &SEGMENT_HEADER);
        assert_eq!(seg0.len(), 18 + 9);
        assert_eq!(&seg0[8..13], &[3, ENCODING_XOR, b'a', b'b', b'c']);
        assert_eq!(seg0[17], 0);
        assert_eq!(&seg0[18..23], &[3, ENCODING_XOR, b'd', b'e', b'f']);

        let crc = crc32c::crc32c(&[ENCODING_XOR, b'a', b'b', b'c']);
        assert_eq!(&seg0[13..17], &crc.to_be_bytes());

        let seg1 = tokio::fs::read(chunks_dir.join("000002")).await?;
        assert_eq!(seg1.len(), 8 + 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_chunks_rejects_bad_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut w = ChunkWriter::new(dir.path()).await?;
        w.write_chunks(&[meta(ChunkRef::join(0, 8), b"abc")]).await?;
        assert!(w
            .write_chunks(&[meta(ChunkRef::join(0, 10), b"abc")])
            .await
            .is_err());

        let mut w = ChunkWriter::new(dir.path().join("skip")).await?;
        assert!(w
            .write_chunks(&[meta(ChunkRef::join(1, 8), b"abc")])
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_no_segment_without_chunks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let chunks_dir = dir.path().join("chunks");

        ChunkWriter::new(&chunks_dir).await?.close().await?;

        let mut entries = tokio::fs::read_dir(&chunks_dir).await?;
        assert!(entries.next_entry().await?.is_none());
        Ok(())
    }
}
