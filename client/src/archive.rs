//! Read elements of an inserted archive through a local cache.
//!
//! A [Handler] refers to an archive by the [Key] it was inserted under. Reads are served
//! from the cache of a [Manager]. Until the archive has been extracted once, a handler
//! created with `force_refetch` ignores the cache so that stale entries are not served.

use crate::Key;
use bytes::Bytes;
use tracing::trace;

/// Name of the element holding the metadata of an archive.
pub const METADATA: &str = ".metadata";

/// Container format of an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Zip,
    Tar,
}

/// Compression applied to an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compressor {
    None,
    Gzip,
    Bzip2,
    Lzma,
}

/// Interface responsible for extracting archives and caching their elements.
pub trait Manager {
    type Error: std::error::Error;

    /// Returns the cached element `name` of the archive stored under `key`, if any.
    fn cached(&self, key: &Key, name: &str) -> Option<Bytes>;

    /// Extract every element of `archive` into the cache.
    ///
    /// Returns the content of `element`, if requested and present in the archive.
    fn extract_to_cache(
        &self,
        key: &Key,
        kind: Kind,
        compressor: Compressor,
        archive: Bytes,
        element: Option<&str>,
    ) -> Result<Option<Bytes>, Self::Error>;
}

/// Handle to one archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    key: Key,
    kind: Kind,
    compressor: Compressor,
    force_refetch: bool,
}

impl Handler {
    pub fn new(key: Key, kind: Kind, compressor: Compressor, force_refetch: bool) -> Self {
        Self {
            key,
            kind,
            compressor,
            force_refetch,
        }
    }

    /// Returns the cached element `name`, if any.
    ///
    /// Always returns `None` while a refetch of the archive is forced.
    pub fn get<M: Manager>(&self, name: &str, manager: &M) -> Option<Bytes> {
        if self.force_refetch {
            return None;
        }
        trace!(key = %self.key, name, "checking cache");
        manager.cached(&self.key, name)
    }

    /// Returns the cached metadata of the archive, if any.
    pub fn metadata<M: Manager>(&self, manager: &M) -> Option<Bytes> {
        self.get(METADATA, manager)
    }

    /// Extract `archive` into the cache of `manager`.
    ///
    /// Once extracted, cached elements are served even if a refetch was forced.
    pub fn extract_to_cache<M: Manager>(
        &mut self,
        archive: Bytes,
        element: Option<&str>,
        manager: &M,
    ) -> Result<Option<Bytes>, M::Error> {
        self.force_refetch = false;
        manager.extract_to_cache(&self.key, self.kind, self.compressor, archive, element)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn compressor(&self) -> Compressor {
        self.compressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, ManagerError};

    fn archive() -> (Key, Bytes) {
        let archive = Bytes::from_static(b"archive");
        (Key::for_block(&archive), archive)
    }

    fn manager(key: Key) -> mocks::Manager {
        let manager = mocks::Manager::new();
        manager.register(
            key,
            vec![
                (METADATA, Bytes::from_static(b"meta")),
                ("index.html", Bytes::from_static(b"<html/>")),
            ],
        );
        manager
    }

    #[test]
    fn test_get_after_extract() {
        let (key, archive) = archive();
        let manager = manager(key);
        let mut handler = Handler::new(key, Kind::Tar, Compressor::Gzip, false);

        // Nothing cached yet
        assert_eq!(handler.get("index.html", &manager), None);
        assert_eq!(handler.metadata(&manager), None);

        // Extraction returns the requested element and caches the rest
        let element = handler
            .extract_to_cache(archive, Some("index.html"), &manager)
            .unwrap();
        assert_eq!(element, Some(Bytes::from_static(b"<html/>")));
        assert_eq!(handler.metadata(&manager), Some(Bytes::from_static(b"meta")));
        assert_eq!(handler.get("missing", &manager), None);
        assert_eq!(manager.extractions(), 1);
    }

    #[test]
    fn test_force_refetch() {
        let (key, archive) = archive();
        let manager = manager(key);

        // Populate the cache through another handler
        let mut warm = Handler::new(key, Kind::Zip, Compressor::None, false);
        warm.extract_to_cache(archive.clone(), None, &manager).unwrap();
        assert!(warm.metadata(&manager).is_some());

        // A forced refetch ignores the cache until the archive is extracted again
        let mut handler = Handler::new(key, Kind::Zip, Compressor::None, true);
        let cloned = handler.clone();
        assert_eq!(handler.metadata(&manager), None);
        handler.extract_to_cache(archive, None, &manager).unwrap();
        assert!(handler.metadata(&manager).is_some());
        assert_eq!(manager.extractions(), 2);

        // Clones are independent
        assert_eq!(cloned.metadata(&manager), None);
    }

    #[test]
    fn test_extract_unknown_archive() {
        let manager = mocks::Manager::new();
        let key = Key::for_block(b"unknown");
        let mut handler = Handler::new(key, Kind::Tar, Compressor::Lzma, true);
        let result = handler.extract_to_cache(Bytes::new(), None, &manager);
        assert_eq!(result, Err(ManagerError::UnknownArchive(key)));
        assert_eq!(handler.key(), &key);
        assert_eq!(handler.kind(), Kind::Tar);
        assert_eq!(handler.compressor(), Compressor::Lzma);
    }
}
