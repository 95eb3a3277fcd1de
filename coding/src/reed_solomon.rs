//! Reed-Solomon coding.

use crate::{Encoder, Error};
use bytes::Bytes;
use reed_solomon_simd::ReedSolomonEncoder;

/// Default number of check blocks per 100 data blocks.
const DEFAULT_REDUNDANCY: u16 = 100;

/// A systematic Reed-Solomon [Encoder].
///
/// The number of check blocks is `redundancy` percent of the number of data blocks,
/// rounded up. Any `n` of the `n + k` blocks of a segment suffice to recover the
/// `n` data blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReedSolomon {
    redundancy: u16,
}

impl ReedSolomon {
    /// Create a new encoder producing `redundancy` check blocks per 100 data blocks.
    pub fn new(redundancy: u16) -> Self {
        Self { redundancy }
    }
}

impl Default for ReedSolomon {
    fn default() -> Self {
        Self::new(DEFAULT_REDUNDANCY)
    }
}

impl Encoder for ReedSolomon {
    fn check_blocks(&self, data_blocks: usize) -> usize {
        (data_blocks * self.redundancy as usize).div_ceil(100)
    }

    fn validate(&self, block_size: usize) -> Result<(), Error> {
        if block_size == 0 || block_size % 2 != 0 {
            return Err(Error::InvalidBlockSize(block_size));
        }
        Ok(())
    }

    fn encode(&self, data: &[Bytes], block_size: usize) -> Result<Vec<Bytes>, Error> {
        self.validate(block_size)?;
        let recovery = self.check_blocks(data.len());
        if recovery == 0 {
            return Ok(Vec::new());
        }

        // Pad short blocks (typically the last block of a payload)
        let mut encoder = ReedSolomonEncoder::new(data.len(), recovery, block_size)
            .map_err(Error::ReedSolomon)?;
        let mut padded = vec![0u8; block_size];
        for block in data {
            if block.len() > block_size {
                return Err(Error::BlockTooLarge(block.len(), block_size));
            }
            if block.len() == block_size {
                encoder
                    .add_original_shard(block)
                    .map_err(Error::ReedSolomon)?;
                continue;
            }
            padded[..block.len()].copy_from_slice(block);
            padded[block.len()..].fill(0);
            encoder
                .add_original_shard(&padded)
                .map_err(Error::ReedSolomon)?;
        }

        let encoding = encoder.encode().map_err(Error::ReedSolomon)?;
        Ok(encoding
            .recovery_iter()
            .map(Bytes::copy_from_slice)
            .collect())
    }
}
