//! Insert blocks into a simulated network.
//!
//! Every insertion runs as its own task on the runtime. After a configured latency, the
//! insertion fails with probability `1 - success_rate` (before any key is assigned), or
//! derives the key of the block from its content, stores the block in a shared in-memory
//! [Store], and reports success.

use crate::{Error, Key, Kind, Listener, Token};
use bytes::Bytes;
use commonware_runtime::{Clock, Spawner};
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tracing::trace;

/// Configuration for the simulated [Inserter].
#[derive(Clone, Debug)]
pub struct Config {
    /// Time taken by every insertion.
    pub latency: Duration,

    /// Probability of an insertion succeeding (in range [0,1]).
    pub success_rate: f64,
}

/// Blocks inserted into the simulated network, by key.
#[derive(Clone, Default)]
pub struct Store {
    blocks: Arc<Mutex<HashMap<Key, Bytes>>>,
}

impl Store {
    /// Returns the block stored under `key`, if any.
    pub fn get(&self, key: &Key) -> Option<Bytes> {
        self.blocks.lock().unwrap().get(key).cloned()
    }

    /// Returns the number of distinct blocks stored.
    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    /// Returns true if no block is stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().unwrap().is_empty()
    }

    fn put(&self, key: Key, block: Bytes) {
        self.blocks.lock().unwrap().insert(key, block);
    }
}

/// Handle to a simulated insertion.
#[derive(Clone)]
pub struct Unit {
    cancelled: Arc<AtomicBool>,
}

impl crate::Unit for Unit {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// An [crate::Inserter] that stores blocks in a shared [Store].
#[derive(Clone)]
pub struct Inserter<E: Spawner + Clock + Rng> {
    context: E,
    store: Store,
    latency: Duration,
    success_rate: f64,
}

impl<E: Spawner + Clock + Rng> Inserter<E> {
    /// Create a new inserter that stores blocks in `store`.
    pub fn new(context: E, cfg: Config, store: Store) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&cfg.success_rate) {
            return Err(Error::InvalidConfig("success rate must be in [0, 1]"));
        }
        Ok(Self {
            context,
            store,
            latency: cfg.latency,
            success_rate: cfg.success_rate,
        })
    }
}

impl<E: Spawner + Clock + Rng> crate::Inserter for Inserter<E> {
    type Unit = Unit;

    fn insert<L: Listener>(&self, block: Bytes, token: Token, listener: L) -> Unit {
        let cancelled = Arc::new(AtomicBool::new(false));
        let store = self.store.clone();
        let latency = self.latency;
        let success_rate = self.success_rate;
        self.context.clone().spawn({
            let cancelled = cancelled.clone();
            move |mut context| async move {
                context.sleep(latency).await;
                if cancelled.load(Ordering::Acquire) {
                    trace!(?token, "insert cancelled");
                    listener.failed(token, Kind::Cancelled);
                    return;
                }
                if !context.gen_bool(success_rate) {
                    trace!(?token, "insert failed");
                    listener.failed(token, Kind::RouteNotFound);
                    return;
                }
                let key = Key::for_block(&block);
                listener.key_assigned(token, key);
                store.put(key, block);
                trace!(?token, ?key, "inserted");
                listener.succeeded(token);
            }
        });
        Unit { cancelled }
    }
}
