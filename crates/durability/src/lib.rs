//! Durability layer for Snapper
//!
//! Everything that touches disk lives here:
//!
//! - Binary on-disk formats (backlink files, archive files)
//! - Backlink I/O: field reads, reference-count rewrites, validity checks
//! - The in-memory archive and its (de)serialization
//! - Generation directory scanning and upward cascade deletion

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod backlink;
pub mod format;
pub mod generation;

pub use archive::{Archive, ArchiveError};
pub use backlink::{Backlink, BacklinkError};
pub use format::{
    ArchiveHeader, BacklinkHeader, ARCHIVE_ENTRY_SIZE, ARCHIVE_HEADER_SIZE, BACKLINK_HEADER_SIZE,
    MAX_PATH_LEN,
};
pub use generation::{ARCHIVE_FILE, EXT_DIR, SNAPSHOT_DIR};
