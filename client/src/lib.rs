//! Insert large payloads into a content-addressed network as erasure coded segments.
//!
//! # Overview
//!
//! A payload is split into fixed-size data blocks, and the data blocks are grouped into
//! [Segment]s. Each segment computes redundant check blocks with a
//! [splitfile_coding::Encoder] and inserts every data and check block into the network
//! with an [Inserter]. Each block insertion runs independently and reports back to its
//! segment through the [Listener] interface. The segment aggregates those reports and
//! notifies its [Parent] once when it is encoded, once when every block has a [Key], and
//! once when it has finished (successfully or not).
//!
//! The [splitfile] module provides a parent that drives all segments of a payload and
//! assembles a [splitfile::Manifest] of the resulting keys. The [simulated] module
//! provides an [Inserter] backed by an in-memory store.
//!
//! # Status
//!
//! `splitfile-client` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use bytes::Bytes;
use thiserror::Error;

pub mod archive;
mod failures;
pub use failures::{Failures, Kind};
mod key;
pub use key::{Key, Token};
pub mod segment;
pub use segment::Segment;
pub mod simulated;
pub mod splitfile;

#[cfg(test)]
pub mod mocks;

/// Errors that can occur when inserting a segment or a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("storage error: {0}")]
    StorageIo(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("block inserts failed ({kind}): {failures}")]
    Insert { kind: Kind, failures: Failures },
    #[error("cancelled")]
    Cancelled,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Receives progress reports from the insertion of a single block.
///
/// For every block, an [Inserter] reports at most one key and then exactly one of
/// [Listener::succeeded] or [Listener::failed].
pub trait Listener: Clone + Send + Sync + 'static {
    /// The network assigned `key` to the block identified by `token`.
    fn key_assigned(&self, token: Token, key: Key);

    /// The block identified by `token` was inserted.
    fn succeeded(&self, token: Token);

    /// The insertion of the block identified by `token` failed.
    fn failed(&self, token: Token, kind: Kind);
}

/// A handle to a block insertion that is in flight.
pub trait Unit: Clone + Send + 'static {
    /// Request cancellation of the insertion.
    ///
    /// Cancellation is cooperative: the insertion still reports a final outcome to
    /// its [Listener] (typically a failure of kind [Kind::Cancelled]).
    fn cancel(&self);
}

/// Interface responsible for inserting single blocks into the network.
pub trait Inserter: Clone + Send + Sync + 'static {
    /// Handle to an in-flight insertion.
    type Unit: Unit;

    /// Begin inserting `block`, reporting progress for `token` to `listener`.
    ///
    /// Implementations must not call into `listener` before returning.
    fn insert<L: Listener>(&self, block: Bytes, token: Token, listener: L) -> Self::Unit;
}

/// Interface that owns a set of segments and is notified about their progress.
///
/// Every notification is delivered at most once per segment. Notifications are made
/// synchronously from whichever task drives the segment, so implementations must not
/// block.
pub trait Parent: Clone + Send + Sync + 'static {
    /// The check blocks of `segment` are ready and their insertion is about to start.
    fn segment_encoded(&self, segment: u32);

    /// Every block of `segment` has been assigned a key.
    fn segment_has_keys(&self, segment: u32);

    /// `segment` reached its terminal outcome.
    fn segment_finished(&self, segment: u32);
}
