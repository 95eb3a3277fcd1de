//! Mock implementations of the interfaces around a segment.

use crate::{archive, Key, Kind, Token};
use bytes::Bytes;
use futures::channel::mpsc;
use splitfile_coding::Error as CodingError;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// A notification received by a mock [crate::Parent].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Encoded(u32),
    HasKeys(u32),
    Finished(u32),
}

/// A mock [crate::Parent] that forwards every notification.
#[derive(Clone)]
pub struct Parent {
    sender: mpsc::UnboundedSender<Event>,
}

impl Parent {
    /// Create a new [Parent] and the receiver of its notifications.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }
}

impl crate::Parent for Parent {
    fn segment_encoded(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Event::Encoded(segment));
    }

    fn segment_has_keys(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Event::HasKeys(segment));
    }

    fn segment_finished(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Event::Finished(segment));
    }
}

/// Collect every item already delivered to `receiver`.
pub fn drain<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        items.push(item);
    }
    items
}

/// A report received by a mock [crate::Listener].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Report {
    Key(Token, Key),
    Success(Token),
    Failure(Token, Kind),
}

/// A mock [crate::Listener] that forwards every report.
#[derive(Clone)]
pub struct Listener {
    sender: mpsc::UnboundedSender<Report>,
}

impl Listener {
    /// Create a new [Listener] and the receiver of its reports.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }
}

impl crate::Listener for Listener {
    fn key_assigned(&self, token: Token, key: Key) {
        let _ = self.sender.unbounded_send(Report::Key(token, key));
    }

    fn succeeded(&self, token: Token) {
        let _ = self.sender.unbounded_send(Report::Success(token));
    }

    fn failed(&self, token: Token, kind: Kind) {
        let _ = self.sender.unbounded_send(Report::Failure(token, kind));
    }
}

/// Handle to an insertion started by a mock [Inserter].
#[derive(Clone)]
pub struct Unit {
    token: Token,
    cancelled: Arc<Mutex<Vec<Token>>>,
}

impl crate::Unit for Unit {
    fn cancel(&self) {
        self.cancelled.lock().unwrap().push(self.token);
    }
}

/// A mock [crate::Inserter] that records every insertion and never reports back.
///
/// Tests drive the outcome of each insertion by calling the [crate::Listener] directly.
#[derive(Clone, Default)]
pub struct Inserter {
    started: Arc<Mutex<Vec<(Token, Bytes)>>>,
    cancelled: Arc<Mutex<Vec<Token>>>,
}

impl Inserter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tokens of every insertion started, in order.
    pub fn started(&self) -> Vec<Token> {
        let started = self.started.lock().unwrap();
        started.iter().map(|(token, _)| *token).collect()
    }

    /// Returns the block inserted for `token`, if any.
    pub fn block(&self, token: Token) -> Option<Bytes> {
        let started = self.started.lock().unwrap();
        started
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, block)| block.clone())
    }

    /// Returns the tokens of every insertion cancelled, in order.
    pub fn cancelled(&self) -> Vec<Token> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl crate::Inserter for Inserter {
    type Unit = Unit;

    fn insert<L: crate::Listener>(&self, block: Bytes, token: Token, _listener: L) -> Unit {
        self.started.lock().unwrap().push((token, block));
        Unit {
            token,
            cancelled: self.cancelled.clone(),
        }
    }
}

/// How a mock [Encoder] fails.
#[derive(Clone, Copy, Debug)]
pub enum Failure {
    /// Fail as if the storage backing the blocks failed.
    Io,
    /// Fail within the transform.
    Internal,
    /// Return one check block too few.
    Count,
}

/// A mock [splitfile_coding::Encoder].
///
/// Check block `i` is `block_size` bytes of `0xc0 + i`.
#[derive(Clone, Debug)]
pub struct Encoder {
    check_blocks: usize,
    failure: Option<Failure>,
}

impl Encoder {
    /// Create an encoder producing `check_blocks` check blocks.
    pub fn new(check_blocks: usize) -> Self {
        Self {
            check_blocks,
            failure: None,
        }
    }

    /// Create an encoder producing two check blocks that fails with `failure`.
    pub fn failing(failure: Failure) -> Self {
        Self {
            check_blocks: 2,
            failure: Some(failure),
        }
    }
}

impl splitfile_coding::Encoder for Encoder {
    fn check_blocks(&self, _data_blocks: usize) -> usize {
        self.check_blocks
    }

    fn encode(&self, _data: &[Bytes], block_size: usize) -> Result<Vec<Bytes>, CodingError> {
        let count = match self.failure {
            None => self.check_blocks,
            Some(Failure::Io) => {
                return Err(CodingError::Io(std::io::Error::other("bucket closed")));
            }
            Some(Failure::Internal) => return Err(CodingError::InvalidBlockSize(block_size)),
            Some(Failure::Count) => self.check_blocks - 1,
        };
        Ok((0..count)
            .map(|i| Bytes::from(vec![0xc0 + i as u8; block_size]))
            .collect())
    }
}

/// Errors returned by a mock [archive::Manager].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ManagerError {
    #[error("unknown archive: {0}")]
    UnknownArchive(Key),
}

/// A mock [archive::Manager] with an in-memory cache.
///
/// Archives are registered with their contents up front. Extracting an archive copies all
/// of its elements into the cache.
#[derive(Clone, Default)]
pub struct Manager {
    archives: Arc<Mutex<HashMap<Key, Vec<(String, Bytes)>>>>,
    cache: Arc<Mutex<HashMap<(Key, String), Bytes>>>,
    extractions: Arc<Mutex<usize>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the elements contained in the archive stored under `key`.
    pub fn register(&self, key: Key, elements: Vec<(&str, Bytes)>) {
        let elements = elements
            .into_iter()
            .map(|(name, data)| (name.to_string(), data))
            .collect();
        self.archives.lock().unwrap().insert(key, elements);
    }

    /// Returns the number of archives extracted.
    pub fn extractions(&self) -> usize {
        *self.extractions.lock().unwrap()
    }
}

impl archive::Manager for Manager {
    type Error = ManagerError;

    fn cached(&self, key: &Key, name: &str) -> Option<Bytes> {
        self.cache
            .lock()
            .unwrap()
            .get(&(*key, name.to_string()))
            .cloned()
    }

    fn extract_to_cache(
        &self,
        key: &Key,
        _kind: archive::Kind,
        _compressor: archive::Compressor,
        _archive: Bytes,
        element: Option<&str>,
    ) -> Result<Option<Bytes>, Self::Error> {
        let elements = self
            .archives
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(ManagerError::UnknownArchive(*key))?;
        *self.extractions.lock().unwrap() += 1;

        let mut cache = self.cache.lock().unwrap();
        let mut found = None;
        for (name, data) in elements {
            if Some(name.as_str()) == element {
                found = Some(data.clone());
            }
            cache.insert((*key, name), data);
        }
        Ok(found)
    }
}
