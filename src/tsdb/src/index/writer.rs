use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use bytes::{BufMut, BytesMut};
use historygen_storage::file::WritableFile;
use historygen_storage::Writable;
use tracing::debug;

use crate::chunks::ChunkMeta;
use crate::codec::varint::{put_uvarint, put_uvarint_str, put_varint};
use crate::error::{Error, Result};
use crate::index::{Toc, INDEX_FORMAT_V2, MAGIC_INDEX, SECTION_ALIGNMENT, SERIES_ALIGNMENT};
use crate::labels::Labels;

/// The sections of the index, in the order they must be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IndexStage {
    None,
    Symbols,
    Series,
    LabelIndex,
    Postings,
    Done,
}

/// OffsetEntry is a row of the label index table or the postings table.
struct OffsetEntry {
    keys: Vec<String>,
    offset: u64,
}

/// IndexWriter writes a block index.
///
/// Calls must follow the section order: `add_symbols`, `add_series` for every series in
/// ascending label order, `write_label_index` per label name, `write_postings` per label pair
/// in ascending order, then `close`. Going back to an earlier section is an error.
pub struct IndexWriter {
    wf: WritableFile,
    stage: IndexStage,
    toc: Toc,

    // symbol -> position in the symbol table
    symbols: HashMap<String, u32>,
    // series id -> series reference
    series_refs: HashMap<u64, u32>,
    last_series: Option<Labels>,

    label_indexes: Vec<OffsetEntry>,
    postings: Vec<OffsetEntry>,
    last_postings: Option<(String, String)>,
}

impl IndexWriter {
    /// create opens a new index file at `path` and writes its header. The file must not exist.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut wf = WritableFile::create(path).await?;

        let mut header = BytesMut::with_capacity(5);
        header.put_u32(MAGIC_INDEX);
        header.put_u8(INDEX_FORMAT_V2);
        wf.append(&header).await?;

        Ok(Self {
            wf,
            stage: IndexStage::None,
            toc: Toc::default(),
            symbols: HashMap::new(),
            series_refs: HashMap::new(),
            last_series: None,
            label_indexes: vec![],
            postings: vec![],
            last_postings: None,
        })
    }

    fn pos(&self) -> u64 {
        self.wf.size()
    }

    /// ensure_stage moves the writer forward to `stage`, recording section offsets and writing
    /// the trailing tables when done.
    async fn ensure_stage(&mut self, stage: IndexStage) -> Result<()> {
        if self.stage == stage {
            return Ok(());
        }
        if self.stage > stage {
            return Err(Error::Format(format!(
                "invalid stage {:?}, currently at {:?}",
                stage, self.stage
            )));
        }

        match stage {
            IndexStage::None => {}
            IndexStage::Symbols => self.toc.symbols = self.pos(),
            IndexStage::Series => self.toc.series = self.pos(),
            IndexStage::LabelIndex => self.toc.label_indices = self.pos(),
            IndexStage::Postings => self.toc.postings = self.pos(),
            IndexStage::Done => {
                self.toc.label_indices_table = self.pos();
                let entries = std::mem::take(&mut self.label_indexes);
                self.write_offset_table(&entries).await?;

                self.toc.postings_table = self.pos();
                let entries = std::mem::take(&mut self.postings);
                self.write_offset_table(&entries).await?;

                let toc = self.toc.encode();
                self.wf.append(&toc).await?;
            }
        }

        debug!(from = ?self.stage, to = ?stage, pos = self.pos(), "index stage");
        self.stage = stage;
        Ok(())
    }

    /// write_section writes `len | body | crc`.
    async fn write_section(&mut self, body: &[u8]) -> Result<()> {
        let len = u32::try_from(body.len()).map_err(|_| {
            Error::Format(format!("index section of {} bytes is too large", body.len()))
        })?;
        self.wf.append(&len.to_be_bytes()).await?;
        self.wf.append(body).await?;
        self.wf.append(&crc32c::crc32c(body).to_be_bytes()).await?;
        Ok(())
    }

    async fn align(&mut self, alignment: u64) -> Result<()> {
        let pos = self.pos();
        let padded = (pos + alignment - 1) / alignment * alignment;
        self.wf.pad_to(padded).await?;
        Ok(())
    }

    async fn write_offset_table(&mut self, entries: &[OffsetEntry]) -> Result<()> {
        let mut body = BytesMut::new();
        body.put_u32(entries.len() as u32);
        for e in entries {
            put_uvarint(&mut body, e.keys.len() as u64);
            for k in e.keys.iter() {
                put_uvarint_str(&mut body, k);
            }
            put_uvarint(&mut body, e.offset);
        }
        self.write_section(&body).await
    }

    /// add_symbols writes the symbol table. Every label name and value used by a series must
    /// be in it.
    pub async fn add_symbols(&mut self, symbols: &BTreeSet<String>) -> Result<()> {
        self.ensure_stage(IndexStage::Symbols).await?;

        let mut body = BytesMut::new();
        body.put_u32(symbols.len() as u32);
        self.symbols = HashMap::with_capacity(symbols.len());
        for (i, s) in symbols.iter().enumerate() {
            self.symbols.insert(s.clone(), i as u32);
            put_uvarint_str(&mut body, s);
        }

        self.write_section(&body).await
    }

    fn symbol_ref(&self, s: &str) -> Result<u32> {
        self.symbols
            .get(s)
            .copied()
            .ok_or_else(|| Error::Format(format!("symbol {:?} not found", s)))
    }

    /// add_series writes the series entry of `id`. Series must be added in strictly increasing
    /// label order, and their chunks in time order.
    pub async fn add_series(
        &mut self,
        id: u64,
        labels: &Labels,
        chunks: &[ChunkMeta],
    ) -> Result<()> {
        self.ensure_stage(IndexStage::Series).await?;

        if let Some(last) = self.last_series.as_ref() {
            if labels <= last {
                return Err(Error::Format(format!(
                    "out-of-order series added with label set {}",
                    labels
                )));
            }
        }
        if self.series_refs.contains_key(&id) {
            return Err(Error::Format(format!(
                "series with reference {} already added",
                id
            )));
        }

        self.align(SERIES_ALIGNMENT).await?;
        let series_ref = u32::try_from(self.pos() / SERIES_ALIGNMENT).map_err(|_| {
            Error::Format(format!("series offset {} exceeds the index limit", self.pos()))
        })?;

        let mut body = BytesMut::new();
        put_uvarint(&mut body, labels.len() as u64);
        for l in labels {
            put_uvarint(&mut body, self.symbol_ref(&l.name)? as u64);
            put_uvarint(&mut body, self.symbol_ref(&l.value)? as u64);
        }

        put_uvarint(&mut body, chunks.len() as u64);
        if let Some((first, rest)) = chunks.split_first() {
            put_varint(&mut body, first.min_time);
            put_uvarint(&mut body, (first.max_time - first.min_time) as u64);
            put_uvarint(&mut body, first.reference.as_u64());

            let mut t0 = first.max_time;
            let mut ref0 = first.reference.as_u64() as i64;
            for c in rest {
                if c.min_time < t0 || c.max_time < c.min_time {
                    return Err(Error::Format(format!(
                        "chunk [{}, {}] of series {} overlaps the previous chunk ending at {}",
                        c.min_time, c.max_time, labels, t0
                    )));
                }
                put_uvarint(&mut body, (c.min_time - t0) as u64);
                put_uvarint(&mut body, (c.max_time - c.min_time) as u64);
                t0 = c.max_time;

                let r = c.reference.as_u64() as i64;
                put_varint(&mut body, r - ref0);
                ref0 = r;
            }
        }

        let mut len = BytesMut::with_capacity(5);
        put_uvarint(&mut len, body.len() as u64);
        self.wf.append(&len).await?;
        self.wf.append(&body).await?;
        self.wf.append(&crc32c::crc32c(&body).to_be_bytes()).await?;

        self.series_refs.insert(id, series_ref);
        self.last_series = Some(labels.clone());
        Ok(())
    }

    /// write_label_index writes the values of the label names. `values` holds tuples of
    /// `names.len()` strings, flattened.
    pub async fn write_label_index(&mut self, names: &[&str], values: &[&str]) -> Result<()> {
        if names.is_empty() || values.len() % names.len() != 0 {
            return Err(Error::Format(format!(
                "{} values do not divide into tuples of {} names",
                values.len(),
                names.len()
            )));
        }
        self.ensure_stage(IndexStage::LabelIndex).await?;

        let mut tuples: Vec<&[&str]> = values.chunks(names.len()).collect();
        tuples.sort_unstable();
        tuples.dedup();

        self.align(SECTION_ALIGNMENT).await?;
        self.label_indexes.push(OffsetEntry {
            keys: names.iter().map(|n| n.to_string()).collect(),
            offset: self.pos(),
        });

        let mut body = BytesMut::new();
        body.put_u32(names.len() as u32);
        body.put_u32(tuples.len() as u32);
        for tuple in tuples {
            for v in tuple {
                body.put_u32(self.symbol_ref(v)?);
            }
        }

        self.write_section(&body).await
    }

    /// write_postings writes the ascending ids of the series carrying `name=value`. Label pairs
    /// must be written in ascending order.
    pub async fn write_postings(&mut self, name: &str, value: &str, ids: &[u64]) -> Result<()> {
        self.ensure_stage(IndexStage::Postings).await?;

        if let Some((n, v)) = self.last_postings.as_ref() {
            if (n.as_str(), v.as_str()) >= (name, value) {
                return Err(Error::Format(format!(
                    "postings {}={:?} written after {}={:?}",
                    name, value, n, v
                )));
            }
        }

        let mut body = BytesMut::with_capacity(4 + ids.len() * 4);
        body.put_u32(ids.len() as u32);
        let mut last_ref = None;
        for id in ids {
            let series_ref = self
                .series_refs
                .get(id)
                .copied()
                .ok_or_else(|| Error::Format(format!("postings: series {} not added", id)))?;
            if last_ref.map_or(false, |last| series_ref <= last) {
                return Err(Error::Format(format!(
                    "postings {}={:?} are not ascending at series {}",
                    name, value, id
                )));
            }
            last_ref = Some(series_ref);
            body.put_u32(series_ref);
        }

        self.align(SECTION_ALIGNMENT).await?;
        self.postings.push(OffsetEntry {
            keys: vec![name.to_string(), value.to_string()],
            offset: self.pos(),
        });
        self.last_postings = Some((name.to_string(), value.to_string()));

        self.write_section(&body).await
    }

    /// close writes the offset tables and the TOC, then syncs the file. This commits the index.
    pub async fn close(mut self) -> Result<Toc> {
        self.ensure_stage(IndexStage::Done).await?;
        let toc = self.toc;
        self.wf.close().await?;
        Ok(toc)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use bytes::Bytes;

    use crate::chunks::{ChunkMeta, ChunkRef};
    use crate::codec::ENCODING_XOR;
    use crate::index::reader::IndexReader;
    use crate::index::writer::IndexWriter;
    use crate::labels::{Label, Labels};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        Labels::new(pairs.iter().map(|(n, v)| Label::new(*n, *v)))
    }

    fn chunk(min_time: i64, max_time: i64, reference: ChunkRef) -> ChunkMeta {
        ChunkMeta {
            min_time,
            max_time,
            num_samples: 0,
            reference,
            encoding: ENCODING_XOR,
            data: Bytes::new(),
        }
    }

    fn symbols(s: &[&str]) -> BTreeSet<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_write_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index");

        let a = labels(&[("__name__", "a"), ("job", "x")]);
        let b = labels(&[("__name__", "b"), ("job", "x")]);

        let mut w = IndexWriter::create(&path).await?;
        w.add_symbols(&symbols(&["__name__", "a", "b", "job", "x"]))
            .await?;
        w.add_series(
            0,
            &a,
            &[
                chunk(1000, 2000, ChunkRef::join(0, 8)),
                chunk(3000, 3500, ChunkRef::join(0, 40)),
            ],
        )
        .await?;
        w.add_series(1, &b, &[chunk(1000, 2000, ChunkRef::join(1, 8))])
            .await?;
        w.write_label_index(&["__name__"], &["b", "a", "a"]).await?;
        w.write_label_index(&["job"], &["x"]).await?;
        w.write_postings("", "", &[0, 1]).await?;
        w.write_postings("__name__", "a", &[0]).await?;
        w.write_postings("__name__", "b", &[1]).await?;
        w.write_postings("job", "x", &[0, 1]).await?;
        let toc = w.close().await?;

        let r = IndexReader::open(&path).await?;
        assert_eq!(r.toc(), &toc);
        assert_eq!(r.symbols()?, vec!["__name__", "a", "b", "job", "x"]);
        assert_eq!(r.label_values("__name__")?, vec!["a", "b"]);
        assert_eq!(r.label_values("job")?, vec!["x"]);

        let keys: Vec<(String, String)> = r
            .postings_table()?
            .into_iter()
            .map(|(n, v, _)| (n, v))
            .collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], (String::new(), String::new()));

        let all = r.postings("", "")?;
        assert_eq!(all.len(), 2);
        assert!(all[0] < all[1]);

        let (series_labels, chunks) = r.series(all[0])?;
        assert_eq!(series_labels, a);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].min_time, 3000);
        assert_eq!(chunks[1].max_time, 3500);
        assert_eq!(chunks[1].reference, ChunkRef::join(0, 40));

        let (series_labels, chunks) = r.series(r.postings("job", "x")?[1])?;
        assert_eq!(series_labels, b);
        assert_eq!(chunks[0].reference, ChunkRef::join(1, 8));
        Ok(())
    }

    #[tokio::test]
    async fn test_stage_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut w = IndexWriter::create(dir.path().join("index")).await?;
        w.add_symbols(&symbols(&["__name__", "a"])).await?;
        w.write_label_index(&["__name__"], &["a"]).await?;
        let err = w
            .add_series(0, &labels(&[("__name__", "a")]), &[])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("stage"));
        Ok(())
    }

    #[tokio::test]
    async fn test_series_out_of_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut w = IndexWriter::create(dir.path().join("index")).await?;
        w.add_symbols(&symbols(&["__name__", "a", "b"])).await?;
        w.add_series(0, &labels(&[("__name__", "b")]), &[]).await?;
        assert!(w
            .add_series(1, &labels(&[("__name__", "a")]), &[])
            .await
            .is_err());
        assert!(w
            .add_series(1, &labels(&[("__name__", "c")]), &[])
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_postings_checks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut w = IndexWriter::create(dir.path().join("index")).await?;
        w.add_symbols(&symbols(&["__name__", "a", "b"])).await?;
        w.add_series(0, &labels(&[("__name__", "a")]), &[]).await?;
        w.add_series(1, &labels(&[("__name__", "b")]), &[]).await?;

        assert!(w.write_postings("", "", &[1, 0]).await.is_err());
        assert!(w.write_postings("", "", &[0, 7]).await.is_err());
        w.write_postings("__name__", "b", &[1]).await?;
        assert!(w.write_postings("__name__", "a", &[0]).await.is_err());
        Ok(())
    }
}
