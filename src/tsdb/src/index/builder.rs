use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::debug;

use crate::block::Series;
use crate::error::Result;
use crate::index::postings::MemPostings;
use crate::index::writer::IndexWriter;
use crate::index::Toc;

/// IndexBuilder collects the symbols, label values and postings of a block's series and writes
/// them as the block index.
pub struct IndexBuilder<'a> {
    series: &'a [Series],

    symbols: BTreeSet<String>,
    label_values: BTreeMap<String, BTreeSet<String>>,
    postings: MemPostings,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(series: &'a [Series]) -> Self {
        let mut label_values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut postings = MemPostings::new();

        for s in series {
            for l in &s.labels {
                label_values
                    .entry(l.name.clone())
                    .or_default()
                    .insert(l.value.clone());
            }
            postings.add(s.id, &s.labels);
        }

        let mut symbols = BTreeSet::new();
        for (name, values) in label_values.iter() {
            symbols.insert(name.clone());
            symbols.extend(values.iter().cloned());
        }

        Self {
            series,
            symbols,
            label_values,
            postings,
        }
    }

    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn label_values(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.label_values
    }

    pub fn postings(&self) -> &MemPostings {
        &self.postings
    }

    /// write writes the index file at `path`. The file is complete once this returns.
    pub async fn write(self, path: impl AsRef<Path>) -> Result<Toc> {
        let mut iw = IndexWriter::create(path).await?;

        iw.add_symbols(&self.symbols).await?;
        debug!(symbols = self.symbols.len(), "wrote index symbols");

        for s in self.series {
            iw.add_series(s.id, &s.labels, &s.chunks).await?;
        }
        debug!(series = self.series.len(), "wrote index series");

        for (name, values) in self.label_values.iter() {
            let values: Vec<&str> = values.iter().map(|v| v.as_str()).collect();
            iw.write_label_index(&[name.as_str()], &values).await?;
        }
        debug!(names = self.label_values.len(), "wrote index label indices");

        for (name, value, ids) in self.postings.iter() {
            iw.write_postings(name, value, ids).await?;
        }
        debug!(postings = self.postings.len(), "wrote index postings");

        iw.close().await
    }
}

#[cfg(test)]
mod tests {
    use crate::block::Series;
    use crate::index::builder::IndexBuilder;
    use crate::index::reader::IndexReader;
    use crate::labels::{Label, Labels};

    fn series(id: u64, name: &str, instance: &str) -> Series {
        Series {
            id,
            labels: Labels::new(vec![
                Label::new("__name__", name),
                Label::new("instance", instance),
            ]),
            chunks: vec![],
        }
    }

    #[test]
    fn test_collect() {
        let series = vec![
            series(0, "a", "host-1"),
            series(1, "a", "host-2"),
            series(2, "b", "host-1"),
        ];
        let b = IndexBuilder::new(&series);

        let symbols: Vec<&str> = b.symbols().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            symbols,
            vec!["__name__", "a", "b", "host-1", "host-2", "instance"]
        );
        assert_eq!(b.label_values()["instance"].len(), 2);
        assert_eq!(b.postings().get("instance", "host-1"), &[0, 2]);
        assert_eq!(b.postings().get("", ""), &[0, 1, 2]);
    }

    #[tokio::test]
    async fn test_write() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index");

        let series = vec![series(0, "a", "host-1"), series(1, "a", "host-2")];
        IndexBuilder::new(&series).write(&path).await?;

        let r = IndexReader::open(&path).await?;
        assert_eq!(r.label_values("__name__")?, vec!["a"]);
        assert_eq!(r.label_values("instance")?, vec!["host-1", "host-2"]);

        let refs = r.postings("instance", "host-2")?;
        assert_eq!(refs.len(), 1);
        let (labels, chunks) = r.series(refs[0])?;
        assert_eq!(labels, series[1].labels);
        assert!(chunks.is_empty());
        Ok(())
    }
}
