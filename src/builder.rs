//! Storage construction.
//!
//! The builder hides the strategy wiring behind a small surface: pick an
//! index variant, opt into LRU eviction and a backend, set the caps, and
//! build. Validation happens once at build time; everything after that is
//! the boolean-contract world of the running engine.
//!
//! ```
//! use kvkit::builder::{CacheKind, StorageBuilder};
//!
//! let storage = StorageBuilder::new(3)
//!     .name("per-ip state")
//!     .cache(CacheKind::Radix)
//!     .lru_expire()
//!     .max_elts(4096)
//!     .build()
//!     .unwrap();
//! assert_eq!(storage.name(), "per-ip state");
//! ```

use crate::backend::Backend;
use crate::cache::{HashCache, RadixCache, TrieCache};
use crate::element::Element;
use crate::error::ConfigError;
use crate::expire::LruExpire;
use crate::storage::{DynBackend, DynCache, DynExpire, Storage};

/// Available index variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    /// Case-insensitive hash index; the general-purpose default.
    #[default]
    Hash,
    /// IPv4 dotted-quad index backed by a radix tree.
    Radix,
    /// Case-insensitive digital trie with sorted iteration.
    Trie,
}

/// Builder for [`Storage`].
pub struct StorageBuilder {
    id: u32,
    name: Option<String>,
    cache: CacheKind,
    lru_expire: bool,
    backend: Option<DynBackend>,
    max_elts: usize,
    max_memory: usize,
}

impl StorageBuilder {
    /// Starts a builder for a storage with the given id.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            cache: CacheKind::default(),
            lru_expire: false,
            backend: None,
            max_elts: 0,
            max_memory: 0,
        }
    }

    /// Sets the printable name; the default is the decimal id.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Picks the index variant.
    pub fn cache(mut self, kind: CacheKind) -> Self {
        self.cache = kind;
        self
    }

    /// Enables LRU eviction.
    pub fn lru_expire(mut self) -> Self {
        self.lru_expire = true;
        self
    }

    /// Attaches a persistence backend.
    pub fn backend(mut self, backend: impl Backend + Send + Sync + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Caps the element count; 0 means unlimited.
    pub fn max_elts(mut self, max_elts: usize) -> Self {
        self.max_elts = max_elts;
        self
    }

    /// Caps the accounted memory in bytes; 0 means unlimited.
    pub fn max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = max_memory;
        self
    }

    /// Validates the configuration and constructs the storage.
    pub fn build(self) -> Result<Storage, ConfigError> {
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(ConfigError::EmptyName);
            }
        }
        // The smallest element has an empty key and an empty value.
        let min_footprint = Element::footprint_for(0, 0);
        if self.max_memory > 0 && self.max_memory < min_footprint {
            return Err(ConfigError::MemoryCapTooSmall(self.max_memory));
        }

        let cache: DynCache = match self.cache {
            CacheKind::Hash => Box::new(HashCache::new()),
            CacheKind::Radix => Box::new(RadixCache::new()),
            CacheKind::Trie => Box::new(TrieCache::new()),
        };
        let expire: Option<DynExpire> = if self.lru_expire {
            Some(Box::new(LruExpire::new()))
        } else {
            None
        };

        Ok(Storage::new(
            self.id,
            self.name,
            cache,
            expire,
            self.backend,
            self.max_elts,
            self.max_memory,
        ))
    }
}
