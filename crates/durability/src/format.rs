//! On-disk byte formats.
//!
//! Two file kinds share the version byte and the XXH32 integrity field.
//! All integers are little-endian and fixed-width.
//!
//! # Backlink file
//!
//! ```text
//! ┌─────────────┬──────────────┬──────────────┬─────────────────────┐
//! │ Version (1) │ Hash (4, LE) │ RefCount (1) │ Payload (variable)  │
//! └─────────────┴──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! The hash covers the payload bytes only.
//!
//! # Archive file
//!
//! ```text
//! ┌─────────────┬──────────────┬───────────────┬─────────────────────┐
//! │ Version (1) │ Hash (4, LE) │ Count (8, LE) │ Count × Entry       │
//! └─────────────┴──────────────┴───────────────┴─────────────────────┘
//!
//! Entry:
//! ┌──────────────┬───────────────────────────────────┐
//! │ Key (8, LE)  │ Path (512, NUL-padded)            │
//! └──────────────┴───────────────────────────────────┘
//! ```
//!
//! The hash covers the body (the entries), not the header.

use snapper_core::{ArchiveKey, SNAPPER_VERSION};
use thiserror::Error;

/// Width of the integrity hash field
pub const HASH_SIZE: usize = 4;

/// Backlink file header size: version + hash + refcount
pub const BACKLINK_HEADER_SIZE: usize = 1 + HASH_SIZE + 1;

/// Fixed width of the path field in an archive entry.
///
/// Paths are NUL-terminated within the field, so the longest representable
/// path string is one byte shorter.
pub const MAX_PATH_LEN: usize = 512;

/// Archive file header size: version + hash + count
pub const ARCHIVE_HEADER_SIZE: usize = 1 + HASH_SIZE + 8;

/// Size of one archive body entry: key + padded path
pub const ARCHIVE_ENTRY_SIZE: usize = 8 + MAX_PATH_LEN;

/// Header of a backlink file (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklinkHeader {
    /// Format version; must equal [`SNAPPER_VERSION`]
    pub version: u8,
    /// XXH32 of the payload bytes
    pub hash: u32,
    /// Number of committed archives referencing this backlink
    pub refcount: u8,
}

impl BacklinkHeader {
    /// Header for a freshly created backlink.
    ///
    /// New backlinks start unreferenced; commit raises the count to one.
    pub fn new(hash: u32) -> Self {
        BacklinkHeader {
            version: SNAPPER_VERSION,
            hash,
            refcount: 0,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; BACKLINK_HEADER_SIZE] {
        let mut bytes = [0u8; BACKLINK_HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.hash.to_le_bytes());
        bytes[5] = self.refcount;
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8; BACKLINK_HEADER_SIZE]) -> Self {
        BacklinkHeader {
            version: bytes[0],
            hash: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            refcount: bytes[5],
        }
    }
}

/// Header of an archive file (13 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Format version; must equal [`SNAPPER_VERSION`]
    pub version: u8,
    /// XXH32 of the body
    pub hash: u32,
    /// Number of entries in the body
    pub count: u64,
}

impl ArchiveHeader {
    /// Build a header for a body hash and entry count.
    pub fn new(hash: u32, count: u64) -> Self {
        ArchiveHeader {
            version: SNAPPER_VERSION,
            hash,
            count,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; ARCHIVE_HEADER_SIZE] {
        let mut bytes = [0u8; ARCHIVE_HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.hash.to_le_bytes());
        bytes[5..13].copy_from_slice(&self.count.to_le_bytes());
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8; ARCHIVE_HEADER_SIZE]) -> Self {
        ArchiveHeader {
            version: bytes[0],
            hash: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            count: u64::from_le_bytes(bytes[5..13].try_into().unwrap()),
        }
    }
}

/// Archive entry decode failures
#[derive(Debug, Error)]
pub enum FormatError {
    /// Path exceeds the fixed field width
    #[error("backlink path of {0} bytes does not fit the {max}-byte field", max = MAX_PATH_LEN - 1)]
    PathTooLong(usize),

    /// Entry is shorter than the fixed entry size
    #[error("archive entry truncated at {0} bytes")]
    TruncatedEntry(usize),

    /// Path field holds invalid UTF-8
    #[error("backlink path is not valid UTF-8")]
    InvalidUtf8,
}

/// Append one `{key, path}` entry to an archive body.
pub fn encode_entry(key: ArchiveKey, path: &str, out: &mut Vec<u8>) -> Result<(), FormatError> {
    if path.len() >= MAX_PATH_LEN {
        return Err(FormatError::PathTooLong(path.len()));
    }
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(path.as_bytes());
    out.extend(std::iter::repeat(0u8).take(MAX_PATH_LEN - path.len()));
    Ok(())
}

/// Decode one `{key, path}` entry from an archive body.
pub fn decode_entry(bytes: &[u8]) -> Result<(ArchiveKey, &str), FormatError> {
    if bytes.len() < ARCHIVE_ENTRY_SIZE {
        return Err(FormatError::TruncatedEntry(bytes.len()));
    }
    let key = ArchiveKey::from_le_bytes(bytes[..8].try_into().unwrap());
    let field = &bytes[8..ARCHIVE_ENTRY_SIZE];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let path = std::str::from_utf8(&field[..end]).map_err(|_| FormatError::InvalidUtf8)?;
    Ok((key, path))
}
