//! kvkit: bounded key-value storage engine with pluggable index, eviction,
//! and persistence strategies.
//!
//! A [`storage::Storage`] couples three strategies behind one reader/writer
//! lock: a [`cache::Cache`] index mapping keys to elements, an optional
//! [`expire::Expire`] policy that picks victims under memory or count
//! pressure, and an optional write-behind [`backend::Backend`]. Elements live
//! in a slot arena with stable handles, so the index, the eviction queue, and
//! the backend queue can all refer to the same element while it moves through
//! its lifetime.
//!
//! ```
//! use kvkit::builder::{CacheKind, StorageBuilder};
//! use kvkit::element::Flags;
//!
//! let storage = StorageBuilder::new(1)
//!     .cache(CacheKind::Hash)
//!     .lru_expire()
//!     .max_elts(1024)
//!     .max_memory(1 << 20)
//!     .build()
//!     .unwrap();
//!
//! assert!(storage.insert(b"session", b"state", Flags::empty(), 60));
//! let elt = storage.lookup(b"session", 0).unwrap();
//! assert_eq!(elt.value(), b"state");
//! ```
//!
//! The crate also ships the two network-facing adaptors the engine's host
//! exposes: an asynchronous HTTP client ([`http`]) and an XMLRPC reply
//! parser ([`xmlrpc`]).

pub mod backend;
pub mod builder;
pub mod cache;
pub mod ds;
pub mod element;
pub mod error;
pub mod expire;
pub mod http;
pub mod storage;
pub mod xmlrpc;

pub mod prelude;
