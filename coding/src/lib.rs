//! Compute check blocks for a segment of data blocks.
//!
//! A segment is a fixed number of equally sized data blocks. An [Encoder] turns those
//! blocks into redundant check blocks, so that the segment can later be reconstructed
//! from any sufficiently large subset of data and check blocks.
//!
//! # Status
//!
//! `splitfile-coding` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use bytes::Bytes;
use thiserror::Error;

mod reed_solomon;
pub use reed_solomon::ReedSolomon;

/// Errors that can occur when computing check blocks.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid block size (must be non-zero and even): {0}")]
    InvalidBlockSize(usize),
    #[error("block too large: {0} > {1}")]
    BlockTooLarge(usize, usize),
    #[error("reed-solomon failure: {0:?}")]
    ReedSolomon(reed_solomon_simd::Error),
}

impl Error {
    /// Returns true if the failure came from the storage backing the blocks,
    /// rather than from the transform itself.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// A forward error correction transform from data blocks to check blocks.
///
/// Implementations must be deterministic: encoding the same data blocks with the same
/// block size always yields the same check blocks.
pub trait Encoder: Clone + Send + Sync + 'static {
    /// Returns the number of check blocks produced for a segment of `data_blocks` blocks.
    fn check_blocks(&self, data_blocks: usize) -> usize;

    /// Returns an error if blocks of `block_size` bytes cannot be encoded.
    fn validate(&self, _block_size: usize) -> Result<(), Error> {
        Ok(())
    }

    /// Compute the check blocks for `data`.
    ///
    /// Every data block must be at most `block_size` bytes long (shorter blocks are
    /// treated as if zero padded). Every returned check block is exactly `block_size`
    /// bytes long and the number returned equals [Encoder::check_blocks] for `data.len()`.
    fn encode(&self, data: &[Bytes], block_size: usize) -> Result<Vec<Bytes>, Error>;
}
