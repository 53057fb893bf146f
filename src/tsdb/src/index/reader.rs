use std::path::Path;

use bytes::Buf;
use historygen_storage::mmap::MmapReadableFile;
use historygen_storage::{RandomAccessFile, RandomAccessFileExt};

use crate::chunks::ChunkRef;
use crate::codec::varint::{get_uvarint, get_uvarint_str, get_varint};
use crate::error::{Error, Result};
use crate::index::{Toc, HEADER_LEN, INDEX_FORMAT_V2, MAGIC_INDEX, SERIES_ALIGNMENT};
use crate::labels::{Label, Labels};

/// SeriesChunk is a chunk reference as recorded in a series entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesChunk {
    pub min_time: i64,
    pub max_time: i64,
    pub reference: ChunkRef,
}

/// IndexReader decodes a written index file, to verify what the writer produced.
pub struct IndexReader {
    data: Vec<u8>,
    toc: Toc,
    symbols: Vec<String>,
}

impl IndexReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = MmapReadableFile::open(path).await?;
        let data = f.read_vec(0, f.size() as usize).await?;
        f.close().await?;

        if data.len() < HEADER_LEN {
            return Err(Error::Corrupted("index is smaller than its header".to_string()));
        }
        let mut header = &data[..HEADER_LEN];
        let magic = header.get_u32();
        if magic != MAGIC_INDEX {
            return Err(Error::Corrupted(format!(
                "invalid index magic number {:x}",
                magic
            )));
        }
        let version = header.get_u8();
        if version != INDEX_FORMAT_V2 {
            return Err(Error::Corrupted(format!(
                "unsupported index version {}",
                version
            )));
        }

        let toc = Toc::decode(&data)?;
        let mut r = Self {
            data,
            toc,
            symbols: vec![],
        };
        r.symbols = r.read_symbols()?;
        Ok(r)
    }

    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    /// section returns the CRC checked body of the `len | body | crc` section at `offset`.
    fn section(&self, offset: u64) -> Result<&[u8]> {
        let offset = offset as usize;
        if offset + 4 > self.data.len() {
            return Err(Error::Corrupted(format!(
                "section at {} is beyond the index",
                offset
            )));
        }
        let mut b = &self.data[offset..];
        let len = b.get_u32() as usize;
        if b.len() < len + 4 {
            return Err(Error::Corrupted(format!(
                "section at {} of {} bytes is truncated",
                offset, len
            )));
        }

        let (body, rest) = b.split_at(len);
        let expected = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if crc32c::crc32c(body) != expected {
            return Err(Error::Corrupted(format!(
                "section at {} checksum mismatch",
                offset
            )));
        }
        Ok(body)
    }

    fn read_symbols(&self) -> Result<Vec<String>> {
        let mut b = self.section(self.toc.symbols)?;
        if b.remaining() < 4 {
            return Err(Error::Corrupted("symbol table without count".to_string()));
        }
        let count = b.get_u32() as usize;
        let mut symbols = Vec::with_capacity(count);
        for _ in 0..count {
            symbols.push(get_uvarint_str(&mut b)?);
        }
        Ok(symbols)
    }

    pub fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }

    fn symbol(&self, i: u64) -> Result<&str> {
        self.symbols
            .get(i as usize)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::Corrupted(format!("unknown symbol reference {}", i)))
    }

    fn offset_table(&self, offset: u64) -> Result<Vec<(Vec<String>, u64)>> {
        let mut b = self.section(offset)?;
        if b.remaining() < 4 {
            return Err(Error::Corrupted("offset table without count".to_string()));
        }
        let count = b.get_u32() as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let n = get_uvarint(&mut b)? as usize;
            let mut keys = Vec::with_capacity(n);
            for _ in 0..n {
                keys.push(get_uvarint_str(&mut b)?);
            }
            entries.push((keys, get_uvarint(&mut b)?));
        }
        Ok(entries)
    }

    /// label_values returns the values listed in the label index of `name`.
    pub fn label_values(&self, name: &str) -> Result<Vec<String>> {
        let offset = self
            .offset_table(self.toc.label_indices_table)?
            .into_iter()
            .find(|(keys, _)| keys.len() == 1 && keys[0] == name)
            .map(|(_, offset)| offset)
            .ok_or_else(|| Error::Corrupted(format!("no label index for {:?}", name)))?;

        let mut b = self.section(offset)?;
        if b.remaining() < 8 {
            return Err(Error::Corrupted("label index without header".to_string()));
        }
        let names = b.get_u32() as usize;
        let count = b.get_u32() as usize;
        if names != 1 || b.remaining() < count * 4 {
            return Err(Error::Corrupted(format!(
                "label index of {:?} is malformed",
                name
            )));
        }

        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.symbol(b.get_u32() as u64)?.to_string());
        }
        Ok(values)
    }

    /// postings_table returns every label pair with the offset of its postings list.
    pub fn postings_table(&self) -> Result<Vec<(String, String, u64)>> {
        let mut pairs = vec![];
        for (mut keys, offset) in self.offset_table(self.toc.postings_table)? {
            if keys.len() != 2 {
                return Err(Error::Corrupted(format!(
                    "postings table entry with {} keys",
                    keys.len()
                )));
            }
            let value = keys.pop().unwrap_or_default();
            let name = keys.pop().unwrap_or_default();
            pairs.push((name, value, offset));
        }
        Ok(pairs)
    }

    /// postings returns the series references listed under `name=value`.
    pub fn postings(&self, name: &str, value: &str) -> Result<Vec<u32>> {
        let offset = self
            .postings_table()?
            .into_iter()
            .find(|(n, v, _)| n == name && v == value)
            .map(|(_, _, offset)| offset)
            .ok_or_else(|| Error::Corrupted(format!("no postings for {}={:?}", name, value)))?;

        let mut b = self.section(offset)?;
        if b.remaining() < 4 {
            return Err(Error::Corrupted("postings without count".to_string()));
        }
        let count = b.get_u32() as usize;
        if b.remaining() < count * 4 {
            return Err(Error::Corrupted("postings list is truncated".to_string()));
        }
        Ok((0..count).map(|_| b.get_u32()).collect())
    }

    /// series decodes the series entry at `series_ref`.
    pub fn series(&self, series_ref: u32) -> Result<(Labels, Vec<SeriesChunk>)> {
        let offset = series_ref as usize * SERIES_ALIGNMENT as usize;
        if offset >= self.data.len() {
            return Err(Error::Corrupted(format!(
                "series {} is beyond the index",
                series_ref
            )));
        }

        let mut b = &self.data[offset..];
        let len = get_uvarint(&mut b)? as usize;
        if b.len() < len + 4 {
            return Err(Error::Corrupted(format!("series {} is truncated", series_ref)));
        }
        let (body, rest) = b.split_at(len);
        let expected = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if crc32c::crc32c(body) != expected {
            return Err(Error::Corrupted(format!(
                "series {} checksum mismatch",
                series_ref
            )));
        }

        let mut b = body;
        let num_labels = get_uvarint(&mut b)?;
        let mut labels = Vec::with_capacity(num_labels as usize);
        for _ in 0..num_labels {
            let name = self.symbol(get_uvarint(&mut b)?)?;
            let value = self.symbol(get_uvarint(&mut b)?)?;
            labels.push(Label::new(name, value));
        }

        let num_chunks = get_uvarint(&mut b)?;
        let mut chunks = Vec::with_capacity(num_chunks as usize);
        if num_chunks > 0 {
            let min_time = get_varint(&mut b)?;
            let max_time = min_time + get_uvarint(&mut b)? as i64;
            let mut reference = get_uvarint(&mut b)? as i64;
            chunks.push(SeriesChunk {
                min_time,
                max_time,
                reference: ChunkRef::from(reference as u64),
            });

            let mut t0 = max_time;
            for _ in 1..num_chunks {
                let min_time = t0 + get_uvarint(&mut b)? as i64;
                let max_time = min_time + get_uvarint(&mut b)? as i64;
                t0 = max_time;
                reference += get_varint(&mut b)?;
                chunks.push(SeriesChunk {
                    min_time,
                    max_time,
                    reference: ChunkRef::from(reference as u64),
                });
            }
        }

        Ok((Labels::new(labels), chunks))
    }
}
