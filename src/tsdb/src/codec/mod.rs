pub mod bit;
pub mod varint;
pub mod xor;
pub mod zigzag;

use crate::error::Result;

/// ENCODING_XOR designates a chunk holding XOR encoded float samples.
pub const ENCODING_XOR: u8 = 1;

/// Appender accumulates samples into an encoded chunk payload.
pub trait Appender {
    /// append adds a sample. Samples must be appended in increasing time order.
    fn append(&mut self, t: i64, v: f64) -> Result<()>;

    fn num_samples(&self) -> usize;

    /// encoding returns the encoding byte stored in front of the payload on disk.
    fn encoding(&self) -> u8;

    /// bytes returns the encoded payload.
    fn bytes(&self) -> Vec<u8>;
}
