use bytes::Bytes;

use crate::block::planner::BlockWindow;
use crate::chunks::EncodedChunk;
use crate::codec::xor::XorChunk;
use crate::codec::Appender;
use crate::error::{Error, Result};
use crate::generator::TimeseriesGenerator;
use crate::options::{ChunkMaxTime, FormatOptions};

/// ChunkBuilder samples a series over one block and cuts the samples into chunks.
///
/// A block window is divided into chunk windows of `sample_interval * samples_per_chunk`. The
/// last window is cut at the block end, so the windows cover the block exactly. Within a window
/// the series is sampled every `sample_interval` from the window start, strictly before its end.
pub struct ChunkBuilder {
    sample_interval: i64,
    chunk_length: i64,
    max_chunk_size: usize,
    chunk_overhead_size: usize,
    chunk_max_time: ChunkMaxTime,
}

impl ChunkBuilder {
    pub fn new(sample_interval: i64, chunk_length: i64, format: &FormatOptions) -> Self {
        Self {
            sample_interval,
            chunk_length,
            max_chunk_size: format.max_chunk_size,
            chunk_overhead_size: format.chunk_overhead_size,
            chunk_max_time: format.chunk_max_time,
        }
    }

    /// build_series encodes every chunk of the series within `window`.
    ///
    /// Either all chunks are returned or none: an oversized chunk fails the whole series.
    pub fn build_series(
        &self,
        series: &dyn TimeseriesGenerator,
        window: &BlockWindow,
    ) -> Result<Vec<EncodedChunk>> {
        let mut chunks = Vec::with_capacity(self.chunks_per_window(window));

        let mut chunk_start = window.min_time;
        while chunk_start < window.max_time {
            let chunk_end = chunk_start
                .saturating_add(self.chunk_length)
                .min(window.max_time);

            let chunk = self.build_chunk(series, chunk_start, chunk_end)?;
            chunks.push(chunk);

            chunk_start = chunk_end;
        }

        Ok(chunks)
    }

    fn build_chunk(
        &self,
        series: &dyn TimeseriesGenerator,
        min_time: i64,
        end_time: i64,
    ) -> Result<EncodedChunk> {
        let mut app = XorChunk::new();

        let mut last = min_time;
        let mut t = min_time;
        while t < end_time {
            app.append(t, series.value(t))?;
            last = t;
            t = match t.checked_add(self.sample_interval) {
                Some(t) => t,
                None => break,
            };
        }

        let data = app.bytes();
        let size = data.len() + self.chunk_overhead_size;
        if size > self.max_chunk_size {
            return Err(Error::ChunkTooBig {
                series: series.name().to_string(),
                size,
                max: self.max_chunk_size,
            });
        }

        let max_time = match self.chunk_max_time {
            ChunkMaxTime::OneInterval => min_time.saturating_add(self.sample_interval),
            ChunkMaxTime::LastSample => last,
        };

        Ok(EncodedChunk {
            min_time,
            max_time,
            num_samples: app.num_samples(),
            encoding: app.encoding(),
            data: Bytes::from(data),
        })
    }

    fn chunks_per_window(&self, window: &BlockWindow) -> usize {
        let len = window.max_time.saturating_sub(window.min_time);
        (len / self.chunk_length + 1).max(0) as usize
    }
}
