//! Insert a payload as a set of segments.
//!
//! # Overview
//!
//! The core of the module is the [Engine]. It is responsible for:
//! - Splitting a payload into fixed-size data blocks (zero padding the last one)
//! - Grouping the data blocks into [Segment](crate::Segment)s of at most
//!   [Config::segment_size] blocks and starting all of them
//! - Collecting the keys of every block into a [Manifest]
//!
//! # Details
//!
//! Every segment reports its progress to the [Mailbox] of the engine, which implements
//! [crate::Parent]. Once every segment has finished, the engine resolves with the [Manifest]
//! of the payload. If any segment fails, the engine cancels all other segments and resolves
//! with the error of the first segment that failed.
//!
//! The [Mailbox] can also be used to cancel the insertion of the payload, in which case the
//! engine cancels every segment and resolves with [crate::Error::Cancelled].

use crate::Key;

mod config;
pub use config::Config;
mod engine;
pub use engine::Engine;
mod ingress;
pub use ingress::Mailbox;
pub(crate) use ingress::Message;
mod metrics;

/// Keys of the blocks of one segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentKeys {
    pub data: Vec<Key>,
    pub check: Vec<Key>,
}

/// Everything required to retrieve an inserted payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    /// Length of the payload in bytes (before padding).
    pub length: usize,

    /// Size of every block.
    pub block_size: usize,

    /// Keys of every segment, in order.
    pub segments: Vec<SegmentKeys>,
}

impl Manifest {
    /// Returns the number of blocks (data and check) referenced by the manifest.
    pub fn blocks(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.data.len() + segment.check.len())
            .sum()
    }
}
