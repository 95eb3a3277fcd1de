//! Encode and insert one segment of a payload.
//!
//! # Lifecycle
//!
//! A [Segment] is created with its data blocks and started with [Segment::start]. Starting
//! begins the insertion of every data block and, if an [Encoder] is configured, schedules
//! the computation of check blocks on the runtime. Once check blocks are available, the
//! parent is notified ([Parent::segment_encoded]) and their insertion begins. Without an
//! encoder, or with one that produces no check blocks for the segment, the segment is
//! encoded from the start and has no check blocks.
//!
//! Block insertions report back through the [Listener] implementation of the segment:
//! - When every block has been assigned a key, the parent is notified once
//!   ([Parent::segment_has_keys]).
//! - When every block has completed, the segment finishes with success if no block failed
//!   and with an [Error::Insert] describing the failures otherwise.
//!
//! An encoding failure or [Segment::cancel] finishes the segment immediately and cancels
//! every insertion still in flight. Whichever path finishes the segment first wins and the
//! parent is notified exactly once ([Parent::segment_finished]).
//!
//! # Locking
//!
//! All mutable bookkeeping lives in a single mutex-guarded [State]. The lock is held only
//! for constant-time updates and never while calling into the [Inserter], a [Unit] or the
//! [Parent].

use crate::{Error, Failures, Inserter, Key, Kind, Listener, Parent, Token, Unit};
use bytes::Bytes;
use commonware_runtime::Spawner;
use splitfile_coding::Encoder;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Configuration for a [Segment].
#[derive(Clone, Debug)]
pub struct Config<C: Encoder> {
    /// Position of the segment among its siblings.
    pub number: u32,

    /// Transform used to compute check blocks, if any.
    pub coding: Option<C>,

    /// Size of every block of the segment.
    ///
    /// Data blocks may be shorter (they are zero padded when encoding). Check blocks are
    /// exactly this size.
    pub block_size: usize,
}

/// Ownership of the insertion of one block.
enum Slot<U> {
    /// The insertion is being set up.
    Pending,

    /// The insertion is in flight.
    Running(U),

    /// The insertion reported its outcome.
    Done,
}

impl<U> Slot<U> {
    fn is_done(&self) -> bool {
        matches!(self, Slot::Done)
    }
}

/// Mutable bookkeeping of a [Segment].
struct State<U> {
    check_blocks: Vec<Bytes>,

    data_keys: Vec<Option<Key>>,
    check_keys: Vec<Option<Key>>,

    data_inserts: Vec<Slot<U>>,
    check_inserts: Vec<Slot<U>>,

    started: bool,
    encoded: bool,
    keys_assigned: usize,
    completed: usize,
    failures: Failures,

    /// Set exactly once, when the segment finishes.
    outcome: Option<Result<(), Error>>,
}

impl<U: Unit> State<U> {
    fn total(&self) -> usize {
        self.data_inserts.len() + self.check_inserts.len()
    }

    fn key_mut(&mut self, token: Token) -> Option<&mut Option<Key>> {
        match token {
            Token::Data(index) => self.data_keys.get_mut(index),
            Token::Check(index) => self.check_keys.get_mut(index),
        }
    }

    fn slot_mut(&mut self, token: Token) -> Option<&mut Slot<U>> {
        match token {
            Token::Data(index) => self.data_inserts.get_mut(index),
            Token::Check(index) => self.check_inserts.get_mut(index),
        }
    }

    /// Returns a handle to every insertion still in flight.
    fn running(&self) -> Vec<U> {
        self.data_inserts
            .iter()
            .chain(self.check_inserts.iter())
            .filter_map(|slot| match slot {
                Slot::Running(unit) => Some(unit.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the first token without a key, if any.
    fn missing_key(&self) -> Option<Token> {
        if let Some(index) = self.data_keys.iter().position(Option::is_none) {
            return Some(Token::Data(index));
        }
        self.check_keys
            .iter()
            .position(Option::is_none)
            .map(Token::Check)
    }
}

struct Inner<E: Spawner, C: Encoder, I: Inserter, P: Parent> {
    context: E,
    number: u32,
    coding: Option<C>,
    block_size: usize,
    data_blocks: Vec<Bytes>,
    inserter: I,
    parent: P,
    state: Mutex<State<I::Unit>>,
}

/// One shard of a payload: its data blocks, the check blocks computed for them, and the
/// insertion of all of them.
///
/// Cloning a [Segment] returns another handle to the same segment.
pub struct Segment<E: Spawner, C: Encoder, I: Inserter, P: Parent> {
    inner: Arc<Inner<E, C, I, P>>,
}

impl<E: Spawner, C: Encoder, I: Inserter, P: Parent> Clone for Segment<E, C, I, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Spawner, C: Encoder, I: Inserter, P: Parent> Segment<E, C, I, P> {
    /// Create a new segment over `data_blocks`.
    ///
    /// # Panics
    ///
    /// Panics if `data_blocks` is empty.
    pub fn new(
        context: E,
        cfg: Config<C>,
        data_blocks: Vec<Bytes>,
        inserter: I,
        parent: P,
    ) -> Self {
        assert!(
            !data_blocks.is_empty(),
            "segment must contain at least one data block"
        );
        let check_count = cfg
            .coding
            .as_ref()
            .map_or(0, |coding| coding.check_blocks(data_blocks.len()));
        let state = State {
            check_blocks: Vec::new(),
            data_keys: vec![None; data_blocks.len()],
            check_keys: vec![None; check_count],
            data_inserts: (0..data_blocks.len()).map(|_| Slot::Pending).collect(),
            check_inserts: (0..check_count).map(|_| Slot::Pending).collect(),
            started: false,
            encoded: check_count == 0,
            keys_assigned: 0,
            completed: 0,
            failures: Failures::new(),
            outcome: None,
        };
        Self {
            inner: Arc::new(Inner {
                context,
                number: cfg.number,
                coding: cfg.coding,
                block_size: cfg.block_size,
                data_blocks,
                inserter,
                parent,
                state: Mutex::new(state),
            }),
        }
    }

    /// Begin inserting the data blocks and, if configured, computing the check blocks.
    ///
    /// Starting a segment that already finished (for example, cancelled) has no effect.
    pub fn start(&self) {
        let encoded = {
            let mut state = self.inner.state.lock().unwrap();
            if state.started {
                warn!(segment = self.inner.number, "already started");
                return;
            }
            state.started = true;
            if state.outcome.is_some() {
                debug!(segment = self.inner.number, "finished before start");
                return;
            }
            state.encoded
        };

        // Encoding runs concurrently with the data block inserts
        if encoded {
            debug!(segment = self.inner.number, "no check blocks required");
            self.inner.parent.segment_encoded(self.inner.number);
        } else {
            let segment = self.clone();
            self.inner
                .context
                .clone()
                .spawn(move |_| async move { segment.encode() });
        }

        for (index, block) in self.inner.data_blocks.iter().enumerate() {
            self.insert(block.clone(), Token::Data(index));
        }
    }

    /// Compute the check blocks and begin inserting them.
    fn encode(&self) {
        let Some(coding) = &self.inner.coding else {
            return;
        };
        let check_blocks = match coding.encode(&self.inner.data_blocks, self.inner.block_size) {
            Ok(check_blocks) => check_blocks,
            Err(err) if err.is_io() => {
                error!(segment = self.inner.number, ?err, "failed to encode");
                self.finish_with(Error::StorageIo(err.to_string()));
                return;
            }
            Err(err) => {
                error!(segment = self.inner.number, ?err, "failed to encode");
                self.finish_with(Error::Internal(err.to_string()));
                return;
            }
        };

        {
            let mut state = self.inner.state.lock().unwrap();
            if check_blocks.len() != state.check_inserts.len() {
                let msg = format!(
                    "expected {} check blocks, got {}",
                    state.check_inserts.len(),
                    check_blocks.len()
                );
                drop(state);
                error!(segment = self.inner.number, %msg, "failed to encode");
                self.finish_with(Error::Internal(msg));
                return;
            }
            if state.outcome.is_some() {
                debug!(
                    segment = self.inner.number,
                    "finished before encoding completed"
                );
                return;
            }
            state.check_blocks = check_blocks.clone();
            state.encoded = true;
        }
        debug!(
            segment = self.inner.number,
            check_blocks = check_blocks.len(),
            "encoded"
        );
        self.inner.parent.segment_encoded(self.inner.number);

        for (index, block) in check_blocks.into_iter().enumerate() {
            self.insert(block, Token::Check(index));
        }
    }

    /// Begin inserting one block and take ownership of the in-flight insertion.
    fn insert(&self, block: Bytes, token: Token) {
        let unit = self.inner.inserter.insert(block, token, self.clone());

        let mut state = self.inner.state.lock().unwrap();
        let finished = state.outcome.is_some();
        let Some(slot) = state.slot_mut(token) else {
            error!(segment = self.inner.number, ?token, "unknown token");
            return;
        };
        match slot {
            Slot::Pending if finished => {
                drop(state);
                unit.cancel();
            }
            Slot::Pending => *slot = Slot::Running(unit),
            Slot::Done => {
                // The insertion already reported its outcome
            }
            Slot::Running(_) => {
                error!(segment = self.inner.number, ?token, "inserted twice");
            }
        }
    }

    /// Record the completion of the insertion of `token`.
    ///
    /// Returns true if this completion finished the segment.
    fn completed(&self, token: Token, failure: Option<Kind>) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        let Some(slot) = state.slot_mut(token) else {
            error!(segment = self.inner.number, ?token, "unknown token");
            return false;
        };
        if slot.is_done() {
            error!(segment = self.inner.number, ?token, "completed twice");
            return false;
        }
        *slot = Slot::Done;
        if let Some(kind) = failure {
            state.failures.merge(kind);
        }
        state.completed += 1;
        if state.completed != state.total() || state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(match state.failures.to_error() {
            Some(err) => Err(err),
            None => Ok(()),
        });
        true
    }

    /// Finish the segment with `error` and cancel every insertion still in flight.
    ///
    /// Returns false if the segment had already finished.
    fn finish_with(&self, error: Error) -> bool {
        let running = {
            let mut state = self.inner.state.lock().unwrap();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(Err(error));
            state.running()
        };
        for unit in running {
            unit.cancel();
        }
        self.inner.parent.segment_finished(self.inner.number);
        true
    }

    /// Cancel the segment and every insertion still in flight.
    ///
    /// Cancelling a finished segment has no effect.
    pub fn cancel(&self) {
        if self.finish_with(Error::Cancelled) {
            debug!(segment = self.inner.number, "cancelled");
        }
    }

    /// Returns the position of the segment among its siblings.
    pub fn number(&self) -> u32 {
        self.inner.number
    }

    /// Returns true if the check blocks of the segment are available.
    pub fn is_encoded(&self) -> bool {
        self.inner.state.lock().unwrap().encoded
    }

    /// Returns true if the segment reached its terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().unwrap().outcome.is_some()
    }

    /// Returns the terminal outcome of the segment, if it has finished.
    pub fn outcome(&self) -> Option<Result<(), Error>> {
        self.inner.state.lock().unwrap().outcome.clone()
    }

    /// Returns the error the segment finished with, if any.
    pub fn error(&self) -> Option<Error> {
        match self.outcome() {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    /// Returns the number of data blocks.
    pub fn data_blocks(&self) -> usize {
        self.inner.data_blocks.len()
    }

    /// Returns the number of check blocks.
    pub fn check_blocks(&self) -> usize {
        self.inner.state.lock().unwrap().check_inserts.len()
    }

    /// Returns the key of every data block (`None` if not yet assigned).
    pub fn data_keys(&self) -> Vec<Option<Key>> {
        self.inner.state.lock().unwrap().data_keys.clone()
    }

    /// Returns the key of every check block (`None` if not yet assigned).
    pub fn check_keys(&self) -> Vec<Option<Key>> {
        self.inner.state.lock().unwrap().check_keys.clone()
    }

    /// Returns the check blocks (empty until the segment is encoded).
    #[cfg(test)]
    fn check_block_contents(&self) -> Vec<Bytes> {
        self.inner.state.lock().unwrap().check_blocks.clone()
    }

    /// Returns the number of blocks that have been assigned a key.
    pub fn keys_assigned(&self) -> usize {
        self.inner.state.lock().unwrap().keys_assigned
    }

    /// Returns the number of block insertions that have completed.
    pub fn blocks_completed(&self) -> usize {
        self.inner.state.lock().unwrap().completed
    }
}

impl<E: Spawner, C: Encoder, I: Inserter, P: Parent> Listener for Segment<E, C, I, P> {
    fn key_assigned(&self, token: Token, key: Key) {
        {
            let mut state = self.inner.state.lock().unwrap();
            let Some(slot) = state.key_mut(token) else {
                error!(segment = self.inner.number, ?token, "unknown token");
                return;
            };
            if let Some(existing) = slot {
                warn!(segment = self.inner.number, ?token, ?existing, ?key, "got key twice");
                return;
            }
            *slot = Some(key);
            state.keys_assigned += 1;
            if state.keys_assigned != state.total() {
                return;
            }
        }

        // Double check
        let missing = self.inner.state.lock().unwrap().missing_key();
        if let Some(token) = missing {
            error!(segment = self.inner.number, ?token, "missing key");
            return;
        }
        debug!(segment = self.inner.number, "all keys assigned");
        self.inner.parent.segment_has_keys(self.inner.number);
    }

    fn succeeded(&self, token: Token) {
        if !self.completed(token, None) {
            return;
        }
        debug!(segment = self.inner.number, "finished");
        self.inner.parent.segment_finished(self.inner.number);
    }

    fn failed(&self, token: Token, kind: Kind) {
        debug!(segment = self.inner.number, ?token, ?kind, "block failed");
        if !self.completed(token, Some(kind)) {
            return;
        }
        debug!(segment = self.inner.number, "finished with failures");
        self.inner.parent.segment_finished(self.inner.number);
    }
}
