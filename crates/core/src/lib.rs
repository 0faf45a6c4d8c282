//! Core types for the Snapper snapshot engine
//!
//! This crate defines the foundational pieces shared by every layer:
//! - Config: engine configuration (redundancy, integrity mode, retention)
//! - Error: the unified error type, with a fatal subset
//! - Content hashing (XXH32) used by both on-disk formats
//! - Generation timestamps: minting, parsing, and aging directory names
//! - Clock: wall-clock seam so expiry and naming are testable

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod timestamp;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use hash::content_hash;

/// Client-chosen identifier for a payload within a snapshot session.
///
/// Opaque to the engine. Unique within one session, but the same key may
/// recur across generations (that is what enables deduplication).
pub type ArchiveKey = u64;

/// On-disk format version stamped into every backlink and archive file.
///
/// A persisted record whose version byte differs is treated as invalid.
pub const SNAPPER_VERSION: u8 = 2;
