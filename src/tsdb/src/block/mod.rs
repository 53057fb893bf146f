//! Block construction.
//!
//! A run is cut into block windows by the `BlockPlanner`. Each block is then built in turn:
//!
//! 1. every series is sampled over the window and cut into chunks,
//! 2. the chunks get segment references and are written to `chunks/`,
//! 3. the `index` is written from the series, their labels and chunk references,
//! 4. `meta.json` is written last.
//!
//! The first error aborts the run. A block directory left by a failed step is not removed.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use historygen_utils::time::millis_format;
use tracing::{debug, info};

use crate::block::meta::{write_meta, BlockMeta};
use crate::block::planner::{BlockIdGenerator, BlockPlanner, BlockWindow};
use crate::chunks::allocator::SegmentAllocator;
use crate::chunks::builder::ChunkBuilder;
use crate::chunks::writer::ChunkWriter;
use crate::chunks::ChunkMeta;
use crate::error::{Error, Result, Stage};
use crate::index::builder::IndexBuilder;
use crate::labels::Labels;
use crate::options::{Opts, Plan};

pub mod meta;
pub mod planner;

pub const CHUNKS_DIRNAME: &str = "chunks";
pub const INDEX_FILENAME: &str = "index";

/// Series is one generator's data within a block.
#[derive(Debug, Clone)]
pub struct Series {
    /// Position of the generator in the run's series list.
    pub id: u64,
    pub labels: Labels,
    pub chunks: Vec<ChunkMeta>,
}

/// generate_blocks writes every block of the run described by `opts` and returns their
/// descriptors in time order.
pub async fn generate_blocks(opts: Opts) -> Result<Vec<BlockMeta>> {
    let plan = opts.resolve()?;
    let planner = BlockPlanner::new(plan.start_time, plan.end_time, plan.block_length)?;
    let ids = BlockIdGenerator::new(plan.seed);

    info!(
        output = %plan.output_dir.display(),
        start = %millis_format(plan.start_time),
        end = %millis_format(plan.end_time),
        series = plan.series.len(),
        "generating blocks"
    );

    let mut metas = vec![];
    for window in planner {
        let meta = create_block(&plan, &ids, &window).await?;
        metas.push(meta);
    }

    Ok(metas)
}

/// create_block writes the block of `window` under the plan's output directory.
pub async fn create_block(
    plan: &Plan,
    ids: &BlockIdGenerator,
    window: &BlockWindow,
) -> Result<BlockMeta> {
    let ulid = ids.id(window).to_string();
    let dir = block_dir(&plan.output_dir, &ulid);

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::from(e).in_block(Stage::Directory, &ulid))?;

    let series = populate_chunks(plan, window, &dir.join(CHUNKS_DIRNAME))
        .await
        .map_err(|e| e.in_block(Stage::Chunks, &ulid))?;

    IndexBuilder::new(&series)
        .write(dir.join(INDEX_FILENAME))
        .await
        .map_err(|e| e.in_block(Stage::Index, &ulid))?;

    let meta = BlockMeta::new(
        ulid.clone(),
        window.min_time,
        window.max_time,
        series.len() as u64,
        plan.chunk_length,
        plan.format.samples_per_chunk as u64,
    );
    write_meta(&dir, &meta)
        .await
        .map_err(|e| e.in_block(Stage::Meta, &ulid))?;

    info!(
        block = %ulid,
        min_time = %millis_format(window.min_time),
        max_time = %millis_format(window.max_time),
        series = series.len(),
        "block created"
    );

    Ok(meta)
}

pub fn block_dir(output_dir: &Path, ulid: &str) -> PathBuf {
    output_dir.join(ulid)
}

/// populate_chunks builds and writes the chunks of every series. A series is fully encoded
/// before any of its chunks is written, so a chunk that is too big leaves nothing of that series
/// on disk.
async fn populate_chunks(plan: &Plan, window: &BlockWindow, dir: &Path) -> Result<Vec<Series>> {
    let builder = ChunkBuilder::new(plan.sample_interval, plan.chunk_length, &plan.format);
    let mut allocator = SegmentAllocator::new(&plan.format);
    let mut cw = ChunkWriter::new(dir).await?;

    let mut series = Vec::with_capacity(plan.series.len());
    for (id, generator) in plan.series.iter().enumerate() {
        let encoded = builder.build_series(generator.as_ref(), window)?;

        let mut chunks = Vec::with_capacity(encoded.len());
        for chunk in encoded {
            chunks.push(allocator.place(chunk)?);
        }
        cw.write_chunks(&chunks).await?;

        // the index only needs the references
        for chunk in chunks.iter_mut() {
            chunk.data = Bytes::new();
        }

        series.push(Series {
            id: id as u64,
            labels: generator.labels().clone(),
            chunks,
        });
    }

    cw.close().await?;

    let (segment, size) = allocator.position();
    debug!(segments = segment + 1, last_segment_size = size, "chunks written");

    Ok(series)
}

#[cfg(test)]
mod tests {
    use crate::block::planner::{BlockIdGenerator, BlockWindow};
    use crate::block::{create_block, CHUNKS_DIRNAME, INDEX_FILENAME};
    use crate::error::Stage;
    use crate::generator::{instance_fleet, IncreasingTimeseriesGenerator, TimeseriesGenerator};
    use crate::labels::Labels;
    use crate::options::Opts;

    const HOUR: i64 = 3600 * 1000;

    #[tokio::test]
    async fn test_create_block_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut opts = Opts::new(instance_fleet(2, 0, 0));
        opts.output_dir = Some(dir.path().to_path_buf());
        opts.start_time = Some(0);
        opts.end_time = Some(2 * HOUR);
        let plan = opts.resolve()?;

        let window = BlockWindow {
            index: 0,
            min_time: 0,
            max_time: 2 * HOUR,
        };
        let meta = create_block(&plan, &BlockIdGenerator::new(1), &window).await?;

        let block = dir.path().join(&meta.ulid);
        assert!(block.join(CHUNKS_DIRNAME).join("000001").is_file());
        assert!(!block.join(CHUNKS_DIRNAME).join("000002").exists());
        assert!(block.join(INDEX_FILENAME).is_file());
        assert!(block.join("meta.json").is_file());

        assert_eq!(meta.stats.num_series, 2);
        assert_eq!(meta.stats.num_chunks, 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_block_existing_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut opts = Opts::new(instance_fleet(1, 0, 0));
        opts.output_dir = Some(dir.path().to_path_buf());
        opts.start_time = Some(0);
        opts.end_time = Some(HOUR);
        let plan = opts.resolve()?;

        let window = BlockWindow {
            index: 0,
            min_time: 0,
            max_time: HOUR,
        };
        let ids = BlockIdGenerator::new(1);
        create_block(&plan, &ids, &window).await?;

        // the same id again collides with the written files
        let err = create_block(&plan, &ids, &window).await.err().unwrap();
        assert_eq!(err.stage(), Some(Stage::Chunks));
        assert!(err.to_string().contains(&ids.id(&window).to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_block_out_of_order_series() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let series: Vec<Box<dyn TimeseriesGenerator>> = vec![
            Box::new(IncreasingTimeseriesGenerator::new("b", Labels::default(), 0)),
            Box::new(IncreasingTimeseriesGenerator::new("a", Labels::default(), 0)),
        ];
        let mut opts = Opts::new(series);
        opts.output_dir = Some(dir.path().to_path_buf());
        opts.start_time = Some(0);
        opts.end_time = Some(HOUR);
        let plan = opts.resolve()?;

        let window = BlockWindow {
            index: 0,
            min_time: 0,
            max_time: HOUR,
        };
        let ids = BlockIdGenerator::new(1);
        let err = create_block(&plan, &ids, &window).await.err().unwrap();

        let ulid = ids.id(&window).to_string();
        assert_eq!(err.stage(), Some(Stage::Index));
        assert_eq!(err.block(), Some(ulid.as_str()));
        assert!(err.to_string().contains(&ulid));
        assert!(err.to_string().contains("out-of-order series"));
        Ok(())
    }
}
