//! Error types.
//!
//! The engine keeps boolean and `Option` contracts for its operational
//! surface: capacity, absence, and shape failures are reported, never
//! raised. Typed errors exist only where construction can be rejected
//! outright.

use thiserror::Error;

/// Error returned when a storage configuration is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An explicit name was given but empty.
    #[error("storage name must not be empty")]
    EmptyName,

    /// The memory cap is smaller than the smallest possible element.
    #[error("memory cap of {0} bytes cannot hold any element")]
    MemoryCapTooSmall(usize),
}
