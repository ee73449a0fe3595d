//! Convenience re-exports for the common surface.
//!
//! ```
//! use kvkit::prelude::*;
//!
//! let storage = StorageBuilder::new(1).lru_expire().build().unwrap();
//! assert!(storage.insert(b"k", b"v", Flags::empty(), 0));
//! ```

pub use crate::backend::{Backend, MemoryBackend};
pub use crate::builder::{CacheKind, StorageBuilder};
pub use crate::cache::{Cache, HashCache, RadixCache, TrieCache};
pub use crate::element::{Element, Flags};
pub use crate::error::ConfigError;
pub use crate::expire::{Expire, LruExpire};
pub use crate::storage::{MetricsSnapshot, Storage, MAX_EXPIRE_STEPS};
