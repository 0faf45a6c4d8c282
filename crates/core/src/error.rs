//! Error types for the Snapper engine
//!
//! One unified `Error` enum covers the whole public surface. Variants fall
//! into two bands:
//!
//! - **Caller protocol errors**: returned to the client, no state change.
//! - **Fatal errors**: the engine cannot continue. The host is expected to
//!   treat these as unrecoverable, terminate, and restart; the next
//!   `init_snapshot` reclaims any partial state.
//!
//! Use [`Error::is_fatal`] to tell the bands apart.

use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for Snapper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the Snapper engine
#[derive(Debug, Error)]
pub enum Error {
    /// Operation called while the engine is in the wrong state
    #[error("operation not permitted in the current engine state")]
    InvalidState,

    /// No valid prior generation exists
    #[error("no valid prior generation exists")]
    NoPriorGen,

    /// Snapshot session initialization failed
    #[error("could not initialize snapshot session")]
    InitFailed(#[source] io::Error),

    /// The targeted generation's archive could not be loaded
    #[error("could not load the generation archive")]
    LoadGenFailed,

    /// A persisted record carries a version byte other than the engine's
    #[error("persisted record has a mismatching version")]
    InvalidVersion,

    /// A persisted record failed its content hash check
    #[error("persisted record failed integrity verification")]
    IntegrityFailed,

    /// No backlink is recorded for the requested key
    #[error("no backlink matches the requested key")]
    NoMatches,

    /// The operation was given an empty payload
    #[error("payload is empty")]
    NoData,

    /// Restoration could not complete (undersized destination buffer)
    #[error("restore failed")]
    RestoreFailed,

    /// Purging would leave fewer generations than the configured minimum
    #[error("purge denied: minimum generation count would be violated")]
    PurgeDenied,

    /// The engine was constructed with an invalid configuration
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    // --- Fatal subset ---
    /// Fatal: the snapshot cannot be persisted (write failure, exhaustion)
    #[error("snapshot not possible: {0}")]
    SnapshotNotPossible(String),

    /// Fatal: an archive file is corrupt and integrity mode is on
    #[error("invalid archive file: {0}")]
    InvalidArchiveFile(String),

    /// Fatal: an archive entry is corrupt and integrity mode is on
    #[error("invalid archive entry: {0}")]
    InvalidArchiveEntry(String),

    /// Fatal: a snapshot (backlink) file is corrupt and integrity mode is on
    #[error("invalid snapshot file: {0}")]
    InvalidSnapshotFile(String),

    /// Fatal: a reference count could not be updated
    #[error("reference count update failed: {0}")]
    RefCountFailed(String),

    /// Fatal: a purge could not complete
    #[error("purge failed: {0}")]
    PurgeFailed(String),
}

impl Error {
    /// Whether this error is in the fatal band.
    ///
    /// A fatal error means persisted state may be ahead of or behind the
    /// in-memory view; the host should terminate rather than issue further
    /// operations on this engine value.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SnapshotNotPossible(_)
                | Error::InvalidArchiveFile(_)
                | Error::InvalidArchiveEntry(_)
                | Error::InvalidSnapshotFile(_)
                | Error::RefCountFailed(_)
                | Error::PurgeFailed(_)
        )
    }
}
