#[macro_use]
extern crate lazy_static;

pub mod block;
pub mod chunks;
pub mod codec;
pub mod error;
pub mod generator;
pub mod index;
pub mod labels;
pub mod options;

pub use block::generate_blocks;
pub use block::meta::BlockMeta;
pub use error::{Error, Result, Stage};
pub use generator::{instance_fleet, IncreasingTimeseriesGenerator, TimeseriesGenerator};
pub use labels::{Label, Labels};
pub use options::{ChunkMaxTime, FormatOptions, Opts};
