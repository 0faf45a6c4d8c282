//! Backlink files.
//!
//! A backlink is one payload persisted under a generation's `snapshot/`
//! subtree, addressed by a forward-slash path relative to the engine root
//! (leading `/`). The value type carries only the path; every operation
//! opens the file, does its work, and releases the handle on all exits.
//!
//! Reference-count updates rewrite the whole file. If that write fails the
//! file's contents are undefined and callers treat the backlink as lost.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use snapper_core::{content_hash, SNAPPER_VERSION};
use thiserror::Error;
use tracing::error;

use crate::format::{BacklinkHeader, BACKLINK_HEADER_SIZE, MAX_PATH_LEN};

/// Failure modes of backlink file operations
#[derive(Debug, Error)]
pub enum BacklinkError {
    /// The file could not be opened
    #[error("could not open backlink file")]
    Open(#[source] io::Error),

    /// The file ends before a header field
    #[error("backlink file is missing a header field")]
    MissingField,

    /// The file could not be stat'ed
    #[error("could not stat backlink file")]
    Stats(#[source] io::Error),

    /// The version byte differs from the engine's
    #[error("backlink has a mismatching version")]
    InvalidVersion,

    /// The payload does not hash to the stored value
    #[error("backlink failed integrity verification")]
    InvalidIntegrity,

    /// The payload is empty, or the destination buffer is too small for it
    #[error("insufficient size for backlink payload")]
    InsufficientSize,

    /// The file could not be (re)written
    #[error("could not write backlink file")]
    Write(#[source] io::Error),

    /// The path does not fit the archive entry's fixed field
    #[error("backlink path of {0} bytes exceeds the path field")]
    PathTooLong(usize),
}

/// Path of one backlink file, relative to the engine root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlink {
    value: String,
}

impl Backlink {
    /// Wrap a root-relative path (leading `/`).
    pub fn new(value: impl Into<String>) -> Result<Self, BacklinkError> {
        let value = value.into();
        if value.len() >= MAX_PATH_LEN {
            return Err(BacklinkError::PathTooLong(value.len()));
        }
        Ok(Backlink { value })
    }

    /// The root-relative path string.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Resolve against the engine root.
    pub fn fs_path(&self, root: &Path) -> PathBuf {
        root.join(self.value.trim_start_matches('/'))
    }

    /// Persist a new backlink: `{version, hash, refcount = 0, payload}` in
    /// one write. Commit raises the reference count to one later.
    pub fn create(&self, root: &Path, hash: u32, payload: &[u8]) -> Result<(), BacklinkError> {
        let mut bytes = Vec::with_capacity(BACKLINK_HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&BacklinkHeader::new(hash).to_bytes());
        bytes.extend_from_slice(payload);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(self.fs_path(root))
            .map_err(BacklinkError::Open)?;
        file.write_all(&bytes).map_err(BacklinkError::Write)?;
        Ok(())
    }

    fn open(&self, root: &Path) -> Result<File, BacklinkError> {
        File::open(self.fs_path(root)).map_err(BacklinkError::Open)
    }

    /// Read the 6-byte header.
    pub fn read_header(&self, root: &Path) -> Result<BacklinkHeader, BacklinkError> {
        let mut file = self.open(root)?;
        let mut bytes = [0u8; BACKLINK_HEADER_SIZE];
        file.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BacklinkError::MissingField,
            _ => BacklinkError::Open(e),
        })?;
        Ok(BacklinkHeader::from_bytes(&bytes))
    }

    /// Read the version byte.
    pub fn read_version(&self, root: &Path) -> Result<u8, BacklinkError> {
        Ok(self.read_header(root)?.version)
    }

    /// Read the stored payload hash.
    pub fn read_hash(&self, root: &Path) -> Result<u32, BacklinkError> {
        Ok(self.read_header(root)?.hash)
    }

    /// Read the reference count.
    pub fn read_refcount(&self, root: &Path) -> Result<u8, BacklinkError> {
        Ok(self.read_header(root)?.refcount)
    }

    /// Size of the payload section.
    pub fn payload_size(&self, root: &Path) -> Result<u64, BacklinkError> {
        let meta = std::fs::metadata(self.fs_path(root)).map_err(BacklinkError::Stats)?;
        let size = meta
            .len()
            .checked_sub(BACKLINK_HEADER_SIZE as u64)
            .ok_or(BacklinkError::MissingField)?;
        if size == 0 {
            return Err(BacklinkError::InsufficientSize);
        }
        Ok(size)
    }

    /// Read and verify the payload into `buf`.
    ///
    /// Validates the version byte, then the content hash of what was read.
    /// On a hash mismatch the buffer is zeroed before returning, so a
    /// failed restore never leaks a corrupt payload.
    pub fn read_payload(&self, root: &Path, buf: &mut [u8]) -> Result<usize, BacklinkError> {
        let header = self.read_header(root)?;
        if header.version != SNAPPER_VERSION {
            return Err(BacklinkError::InvalidVersion);
        }

        let size = self.payload_size(root)? as usize;
        if size > buf.len() {
            error!(
                backlink = %self.value,
                size,
                capacity = buf.len(),
                "insufficient buffer size to read from snapshot file"
            );
            return Err(BacklinkError::InsufficientSize);
        }

        let mut file = self.open(root)?;
        file.seek(SeekFrom::Start(BACKLINK_HEADER_SIZE as u64))
            .map_err(BacklinkError::Open)?;
        file.read_exact(&mut buf[..size]).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BacklinkError::MissingField,
            _ => BacklinkError::Open(e),
        })?;

        if content_hash(&buf[..size]) != header.hash {
            buf[..size].fill(0);
            return Err(BacklinkError::InvalidIntegrity);
        }
        Ok(size)
    }

    /// Rewrite the file with a new reference count.
    ///
    /// The payload is read back (and verified) first, then the whole file
    /// is rewritten as `{version, hash, refcount, payload}`.
    pub fn write_refcount(&self, root: &Path, refcount: u8) -> Result<(), BacklinkError> {
        let header = self.read_header(root)?;
        let size = self.payload_size(root)? as usize;
        let mut payload = vec![0u8; size];
        self.read_payload(root, &mut payload)?;

        let mut bytes = Vec::with_capacity(BACKLINK_HEADER_SIZE + size);
        bytes.extend_from_slice(
            &BacklinkHeader {
                version: header.version,
                hash: header.hash,
                refcount,
            }
            .to_bytes(),
        );
        bytes.extend_from_slice(&payload);

        let mut file = File::create(self.fs_path(root)).map_err(BacklinkError::Open)?;
        file.write_all(&bytes).map_err(|e| {
            error!(backlink = %self.value, "could not update reference count");
            BacklinkError::Write(e)
        })?;
        Ok(())
    }

    /// Whether the file's version matches the engine's and its stored hash
    /// equals `expected_hash`.
    ///
    /// The stored hash is compared as-is; the payload itself is not read.
    pub fn is_valid(&self, root: &Path, expected_hash: u32) -> bool {
        match self.read_header(root) {
            Ok(header) => header.version == SNAPPER_VERSION && header.hash == expected_hash,
            Err(_) => false,
        }
    }
}
