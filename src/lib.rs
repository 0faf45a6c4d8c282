//! # Snapper
//!
//! A generational snapshot engine. Opaque, caller-identified payloads are
//! persisted to a hierarchical filesystem as reference-counted backlink
//! files; identical payloads are deduplicated across snapshots up to a
//! configurable redundancy bound, and every committed snapshot is an
//! atomic, restorable generation.
//!
//! # Quick Start
//!
//! ```no_run
//! use snapper::{Config, Snapper};
//!
//! fn main() -> snapper::Result<()> {
//!     let mut engine = Snapper::new("./snapshots", Config::default())?;
//!
//!     // take a snapshot
//!     engine.init_snapshot()?;
//!     engine.take_snapshot(b"page contents", 1)?;
//!     engine.take_snapshot(b"more contents", 2)?;
//!     engine.commit_snapshot()?;
//!
//!     // restore it
//!     let mut buf = [0u8; 64];
//!     engine.open_generation(None)?;
//!     let size = engine.restore(&mut buf, 1)?;
//!     assert_eq!(&buf[..size], b"page contents");
//!     engine.close_generation()?;
//!
//!     // drop the oldest generation
//!     engine.purge(None)?;
//!     Ok(())
//! }
//! ```
//!
//! # Concepts
//!
//! | Term | Meaning |
//! |------|---------|
//! | **Generation** | A timestamp-named directory: one `snapshot/` subtree plus one `archive` manifest; the unit of commit and purge |
//! | **Backlink** | One on-disk payload with its version, content hash, and reference count |
//! | **Archive** | The manifest binding client keys to backlink paths |
//! | **Redundancy** | Bound on a backlink's reference count; at the bound, sharing stops and a fresh copy is cut |
//!
//! # Architecture
//!
//! [`Snapper`] is the engine itself: a single-writer state machine the host
//! owns as a value. [`SnapperSession`] wraps it in the synchronous,
//! mutex-guarded single-client boundary. Errors with
//! [`Error::is_fatal`](Error::is_fatal) true mean the engine must be
//! abandoned and restarted; everything else is an ordinary return code.
//!
//! Internal crates (durability, formats) are not exposed. Only the surface
//! re-exported here is stable.

pub use snapper_core::{
    ArchiveKey, Clock, Config, ConfigError, Error, Result, SystemClock, SNAPPER_VERSION,
};
pub use snapper_engine::{InitOutcome, Snapper, State};
pub use snapper_session::{SessionError, SnapperSession};
