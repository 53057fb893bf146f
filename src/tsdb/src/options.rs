use std::path::PathBuf;
use std::time::Duration;

use historygen_utils::time::now;

use crate::chunks::SEGMENT_HEADER;
use crate::codec::varint::uvarint_len;
use crate::error::{Error, Result};
use crate::generator::TimeseriesGenerator;

/// DEFAULT_OUTPUT_DIR is where blocks land when no output directory is given.
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/tsdb";

/// Metrics are produced from one week ago by default.
pub const DEFAULT_HISTORY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

pub const DEFAULT_BLOCK_LENGTH: Duration = Duration::from_secs(2 * 60 * 60);

/// The amount of overhead data per chunk: 2 bytes for the data length, 1 byte for the encoding
/// and 4 bytes for the CRC.
pub const CHUNK_OVERHEAD_SIZE: usize = 7;

/// Each segment must be at most 512MB.
pub const MAX_SEGMENT_SIZE: u64 = 1024 * 1024 * 512;

/// Chunks are kept small for read performance.
pub const MAX_CHUNK_SIZE: usize = 1024 * 16;

/// A chunk holds at most 120 samples.
pub const SAMPLES_PER_CHUNK: usize = 120;

/// The size of the header for each segment file.
pub const SEGMENT_HEADER_SIZE: u64 = SEGMENT_HEADER.len() as u64;

/// ChunkMaxTime selects what a chunk's recorded `max_time` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkMaxTime {
    /// `min_time` plus one sample interval, whatever the chunk holds. This keeps the
    /// historical behaviour of the generator, which readers treat as an approximation.
    #[default]
    OneInterval,
    /// The timestamp of the last sample in the chunk.
    LastSample,
}

/// FormatOptions are the size limits of the on-disk format.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub samples_per_chunk: usize,
    pub max_chunk_size: usize,
    pub chunk_overhead_size: usize,
    pub max_segment_size: u64,
    pub segment_header_size: u64,
    pub chunk_max_time: ChunkMaxTime,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            samples_per_chunk: SAMPLES_PER_CHUNK,
            max_chunk_size: MAX_CHUNK_SIZE,
            chunk_overhead_size: CHUNK_OVERHEAD_SIZE,
            max_segment_size: MAX_SEGMENT_SIZE,
            segment_header_size: SEGMENT_HEADER_SIZE,
            chunk_max_time: ChunkMaxTime::default(),
        }
    }
}

impl FormatOptions {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_chunk == 0 || self.samples_per_chunk > u16::MAX as usize {
            return Err(Error::Config(format!(
                "samples per chunk must be within [1, {}], got {}",
                u16::MAX,
                self.samples_per_chunk
            )));
        }

        if self.max_chunk_size <= self.chunk_overhead_size {
            return Err(Error::Config(format!(
                "max chunk size {} must exceed the chunk overhead {}",
                self.max_chunk_size, self.chunk_overhead_size
            )));
        }
        let max_payload = (self.max_chunk_size - self.chunk_overhead_size) as u64;
        // length varint + encoding byte + crc
        let framing = uvarint_len(max_payload) + 1 + 4;
        if self.chunk_overhead_size < framing {
            return Err(Error::Config(format!(
                "chunk overhead {} cannot hold the framing of a {} byte payload ({} bytes)",
                self.chunk_overhead_size, max_payload, framing
            )));
        }

        if self.segment_header_size < SEGMENT_HEADER_SIZE {
            return Err(Error::Config(format!(
                "segment header size {} is smaller than the {} byte file header",
                self.segment_header_size, SEGMENT_HEADER_SIZE
            )));
        }
        if self.max_segment_size > u32::MAX as u64 + 1 {
            return Err(Error::Config(format!(
                "max segment size {} does not fit a 32 bit offset",
                self.max_segment_size
            )));
        }
        if self.segment_header_size + self.max_chunk_size as u64 > self.max_segment_size {
            return Err(Error::Config(format!(
                "a {} byte chunk does not fit a {} byte segment after its {} byte header",
                self.max_chunk_size, self.max_segment_size, self.segment_header_size
            )));
        }

        Ok(())
    }
}

/// Opts configures a generation run. Every `None` falls back to its documented default.
pub struct Opts {
    /// The directory to place the generated blocks in. Default `/tmp/tsdb`.
    pub output_dir: Option<PathBuf>,
    /// Generators defining each time series to be created.
    pub series: Vec<Box<dyn TimeseriesGenerator>>,
    /// Metrics are produced from this time, in epoch milliseconds. Default one week before now.
    pub start_time: Option<i64>,
    /// Metrics are produced until this time, in epoch milliseconds. Default now.
    pub end_time: Option<i64>,
    /// How often to sample the metrics. Default 15s.
    pub sample_interval: Option<Duration>,
    /// The length of time each block covers. Default 2 hours.
    pub block_length: Option<Duration>,
    /// Seed for block identifiers. Default the current time in nanoseconds.
    pub seed: Option<u64>,
    pub format: FormatOptions,
}

impl Opts {
    pub fn new(series: Vec<Box<dyn TimeseriesGenerator>>) -> Self {
        Self {
            output_dir: None,
            series,
            start_time: None,
            end_time: None,
            sample_interval: None,
            block_length: None,
            seed: None,
            format: FormatOptions::default(),
        }
    }

    /// resolve applies defaults and validates the result. Nothing is written to disk here.
    pub fn resolve(self) -> Result<Plan> {
        let now = now();
        let now_millis = now.as_millis() as i64;

        let start_time = self
            .start_time
            .unwrap_or(now_millis - DEFAULT_HISTORY.as_millis() as i64);
        let end_time = self.end_time.unwrap_or(now_millis);
        if start_time >= end_time {
            return Err(Error::Config(format!(
                "start time {} must come before end time {}",
                start_time, end_time
            )));
        }

        let sample_interval = self.sample_interval.unwrap_or(DEFAULT_SAMPLE_INTERVAL);
        let sample_interval = sample_interval.as_millis() as i64;
        if sample_interval <= 0 {
            return Err(Error::Config(
                "sample interval must be at least one millisecond".to_string(),
            ));
        }

        let block_length = self.block_length.unwrap_or(DEFAULT_BLOCK_LENGTH);
        let block_length = block_length.as_millis() as i64;
        if block_length <= 0 {
            return Err(Error::Config(
                "block length must be at least one millisecond".to_string(),
            ));
        }

        self.format.validate()?;

        let chunk_length = sample_interval
            .checked_mul(self.format.samples_per_chunk as i64)
            .ok_or_else(|| Error::Config("chunk length overflows".to_string()))?;

        Ok(Plan {
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            series: self.series,
            start_time,
            end_time,
            sample_interval,
            block_length,
            chunk_length,
            seed: self.seed.unwrap_or(now.as_nanos() as u64),
            format: self.format,
        })
    }
}

/// Plan is a validated `Opts`; all times are epoch milliseconds and all durations milliseconds.
pub struct Plan {
    pub output_dir: PathBuf,
    pub series: Vec<Box<dyn TimeseriesGenerator>>,
    pub start_time: i64,
    pub end_time: i64,
    pub sample_interval: i64,
    pub block_length: i64,
    pub chunk_length: i64,
    pub seed: u64,
    pub format: FormatOptions,
}
