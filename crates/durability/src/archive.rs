//! The archive: per-generation manifest binding keys to backlink paths.
//!
//! In memory it is an ordered map from key to an insertion-ordered queue of
//! backlinks. One key's queue is its redundancy chain; the back (most
//! recently enqueued) element is the authoritative head for reads.
//!
//! On disk it is the generation's `archive` file: a versioned, hashed
//! header followed by fixed-width `{key, path}` entries. A generation is
//! valid exactly when this file parses, its version matches, and its body
//! hashes to the stored value.

use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use snapper_core::{content_hash, ArchiveKey, SNAPPER_VERSION};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backlink::Backlink;
use crate::format::{
    decode_entry, encode_entry, ArchiveHeader, FormatError, ARCHIVE_ENTRY_SIZE,
    ARCHIVE_HEADER_SIZE,
};

/// Failure modes of archive (de)serialization
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive file could not be read or written
    #[error("could not access archive file")]
    Io(#[from] io::Error),

    /// Committing over an existing archive file is not allowed
    #[error("archive file already exists")]
    AlreadyExists,

    /// The version byte differs from the engine's
    #[error("archive has a mismatching version: {0}")]
    VersionMismatch(u8),

    /// The body does not hash to the stored value
    #[error("archive body failed integrity verification")]
    HashMismatch,

    /// The file ends before the declared entry count
    #[error("archive file truncated")]
    Truncated,

    /// An entry could not be decoded
    #[error("invalid archive entry")]
    InvalidEntry(#[from] FormatError),
}

/// In-memory mapping from archive keys to their backlink queues.
#[derive(Debug, Default)]
pub struct Archive {
    entries: BTreeMap<ArchiveKey, VecDeque<Backlink>>,
    total_backlinks: u64,
}

impl Archive {
    /// An empty archive.
    pub fn new() -> Self {
        Archive::default()
    }

    /// Whether the archive holds no entries.
    pub fn is_empty(&self) -> bool {
        self.total_backlinks == 0
    }

    /// Total number of `{key, path}` entries across all queues.
    pub fn total_backlinks(&self) -> u64 {
        self.total_backlinks
    }

    /// Enqueue a backlink at the tail of the key's queue.
    pub fn insert(&mut self, key: ArchiveKey, backlink: Backlink) {
        debug!(key, backlink = %backlink.value(), "archive entry inserted");
        self.entries.entry(key).or_default().push_back(backlink);
        self.total_backlinks += 1;
    }

    /// The authoritative head of a key's queue: its most recent backlink.
    pub fn newest(&self, key: ArchiveKey) -> Option<&Backlink> {
        self.entries.get(&key).and_then(|queue| queue.back())
    }

    /// The full redundancy chain for a key, oldest first.
    pub fn queue(&self, key: ArchiveKey) -> Option<&VecDeque<Backlink>> {
        self.entries.get(&key)
    }

    /// Drop a key's entire queue from the in-memory view.
    ///
    /// Purely in-memory: on-disk files and other generations' references
    /// are untouched.
    pub fn evict(&mut self, key: ArchiveKey) -> bool {
        match self.entries.remove(&key) {
            Some(queue) => {
                self.total_backlinks -= queue.len() as u64;
                debug!(key, "archive entry removed");
                true
            }
            None => {
                warn!(key, "no such key exists in archive");
                false
            }
        }
    }

    /// Drop one backlink from a key's queue, searching from the tail.
    ///
    /// Empty queues are removed with their key.
    pub fn remove_backlink(&mut self, key: ArchiveKey, backlink: &Backlink) -> bool {
        let Some(queue) = self.entries.get_mut(&key) else {
            return false;
        };
        let Some(pos) = queue.iter().rposition(|b| b == backlink) else {
            return false;
        };
        queue.remove(pos);
        self.total_backlinks -= 1;
        if queue.is_empty() {
            self.entries.remove(&key);
        }
        true
    }

    /// Iterate every `{key, backlink}` entry in serialization order:
    /// keys ascending, each queue oldest-to-newest.
    pub fn backlinks(&self) -> impl Iterator<Item = (ArchiveKey, &Backlink)> {
        self.entries
            .iter()
            .flat_map(|(&key, queue)| queue.iter().map(move |backlink| (key, backlink)))
    }

    /// Serialize the body: every entry in [`Archive::backlinks`] order.
    pub fn serialize_body(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut body = Vec::with_capacity(self.total_backlinks as usize * ARCHIVE_ENTRY_SIZE);
        for (key, backlink) in self.backlinks() {
            encode_entry(key, backlink.value(), &mut body)?;
        }
        Ok(body)
    }

    /// Write the archive file `{version, hash, count, body}` into `dir`.
    ///
    /// Refuses to overwrite: a generation's archive is written exactly
    /// once, by commit.
    pub fn commit(&self, dir: &Path, filename: &str) -> Result<(), ArchiveError> {
        let path = dir.join(filename);
        if path.exists() {
            return Err(ArchiveError::AlreadyExists);
        }

        let body = self.serialize_body()?;
        let header = ArchiveHeader::new(content_hash(&body), self.total_backlinks);

        let mut bytes = Vec::with_capacity(ARCHIVE_HEADER_SIZE + body.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&body);

        let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        debug!(path = %path.display(), entries = self.total_backlinks, "archive committed");
        Ok(())
    }

    /// Read and validate an archive file, reconstructing the in-memory
    /// mapping in stored order.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < ARCHIVE_HEADER_SIZE {
            return Err(ArchiveError::Truncated);
        }

        let header = ArchiveHeader::from_bytes(bytes[..ARCHIVE_HEADER_SIZE].try_into().unwrap());
        if header.version != SNAPPER_VERSION {
            return Err(ArchiveError::VersionMismatch(header.version));
        }

        let body = &bytes[ARCHIVE_HEADER_SIZE..];
        let expected = header
            .count
            .checked_mul(ARCHIVE_ENTRY_SIZE as u64)
            .ok_or(ArchiveError::Truncated)?;
        if body.len() as u64 != expected {
            return Err(ArchiveError::Truncated);
        }
        if content_hash(body) != header.hash {
            return Err(ArchiveError::HashMismatch);
        }

        let mut archive = Archive::new();
        for entry in body.chunks_exact(ARCHIVE_ENTRY_SIZE) {
            let (key, path) = decode_entry(entry)?;
            let backlink = Backlink::new(path)
                .map_err(|_| ArchiveError::InvalidEntry(FormatError::PathTooLong(path.len())))?;
            archive.insert(key, backlink);
        }
        Ok(archive)
    }
}
