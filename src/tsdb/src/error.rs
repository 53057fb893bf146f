//! Errors raised while generating blocks.
//!
//! Every error is terminal for the run. The three kinds a caller acts on are:
//! - `Config`: the options are inconsistent; raised before any file is touched.
//! - `ChunkTooBig`: a chunk does not fit the format's chunk size limit.
//! - `Storage`: a file could not be created, written or closed.
//!
//! Errors raised while a block is built are tagged with the stage and the block id: I/O errors
//! become `Storage`, every other kind is wrapped in `Block`.

use std::fmt::{Display, Formatter};
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stage names the part of block construction an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Directory,
    Chunks,
    Index,
    Meta,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory => write!(f, "create block directory"),
            Self::Chunks => write!(f, "write chunks"),
            Self::Index => write!(f, "write index"),
            Self::Meta => write!(f, "write metadata"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("chunk too big for series {series}, calculated size {size} > {max}")]
    ChunkTooBig {
        series: String,
        size: usize,
        max: usize,
    },

    #[error("failed to {stage} for block {block}: {source}")]
    Storage {
        stage: Stage,
        block: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to {stage} for block {block}: {source}")]
    Block {
        stage: Stage,
        block: String,
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("format violation: {0}")]
    Format(String),

    #[error("corrupted data: {0}")]
    Corrupted(String),
}

impl Error {
    /// in_block attaches the stage and block to an error raised while building that block.
    pub fn in_block(self, stage: Stage, block: &str) -> Self {
        match self {
            Self::Io(source) => Self::Storage {
                stage,
                block: block.to_string(),
                source,
            },
            e @ (Self::Storage { .. } | Self::Block { .. }) => e,
            other => Self::Block {
                stage,
                block: block.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_config(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Block { source, .. } => source.is_config(),
            _ => false,
        }
    }

    pub fn is_sizing(&self) -> bool {
        match self {
            Self::ChunkTooBig { .. } => true,
            Self::Block { source, .. } => source.is_sizing(),
            _ => false,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Storage { stage, .. } | Self::Block { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// block returns the id of the block the error was raised in.
    pub fn block(&self) -> Option<&str> {
        match self {
            Self::Storage { block, .. } | Self::Block { block, .. } => Some(block.as_str()),
            _ => None,
        }
    }
}
