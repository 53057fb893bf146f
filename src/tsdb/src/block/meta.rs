use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

pub const META_FILENAME: &str = "meta.json";

const TMP_FILE_SUFFIX: &str = ".tmp";

pub const META_VERSION: u32 = 1;

/// BlockMeta is the descriptor stored as `meta.json` in a block directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    pub version: u32,
    pub ulid: String,
    pub min_time: i64,
    pub max_time: i64,
    pub stats: BlockStats,
    pub compaction: BlockMetaCompaction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    pub num_samples: u64,
    pub num_series: u64,
    pub num_chunks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetaCompaction {
    pub level: u32,
    pub sources: Vec<String>,
}

impl BlockMeta {
    /// new describes a freshly generated block. The counts are estimates: every series is
    /// assumed to hold `block length / chunk length` full chunks.
    pub fn new(
        ulid: String,
        min_time: i64,
        max_time: i64,
        num_series: u64,
        chunk_length: i64,
        samples_per_chunk: u64,
    ) -> Self {
        let chunks_per_series = ((max_time - min_time) / chunk_length).max(0) as u64;
        let num_chunks = num_series * chunks_per_series;

        Self {
            version: META_VERSION,
            ulid: ulid.clone(),
            min_time,
            max_time,
            stats: BlockStats {
                num_samples: num_chunks * samples_per_chunk,
                num_series,
                num_chunks,
            },
            compaction: BlockMetaCompaction {
                level: 1,
                sources: vec![ulid],
            },
        }
    }
}

/// write_meta writes `meta.json` into the block directory. The file is written under a
/// temporary name and renamed into place once synced.
pub async fn write_meta(dir: impl AsRef<Path>, meta: &BlockMeta) -> Result<()> {
    let path = dir.as_ref().join(META_FILENAME);
    let tmp = dir
        .as_ref()
        .join(format!("{}{}", META_FILENAME, TMP_FILE_SUFFIX));

    let data = serde_json::to_vec_pretty(meta).map_err(io::Error::from)?;
    {
        let mut f = tokio::fs::File::create(&tmp).await?;
        f.write_all(&data).await?;
        f.sync_all().await?;
    }
    tokio::fs::rename(&tmp, &path).await?;

    Ok(())
}

pub async fn read_meta(dir: impl AsRef<Path>) -> Result<BlockMeta> {
    let data = tokio::fs::read(dir.as_ref().join(META_FILENAME)).await?;
    let meta = serde_json::from_slice(&data).map_err(io::Error::from)?;
    Ok(meta)
}
