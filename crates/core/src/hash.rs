//! Content hashing
//!
//! One algorithm — XXH32 with a zero seed — covers both on-disk formats:
//! backlink payload hashes and archive body hashes. Mixing algorithms
//! across the two formats is forbidden; the hash is part of the format.

use xxhash_rust::xxh32::xxh32;

/// Seed for all content hashes.
pub const HASH_SEED: u32 = 0;

/// Hash a byte range for integrity checking.
///
/// Stored little-endian as a fixed 4-byte field in both file formats.
pub fn content_hash(bytes: &[u8]) -> u32 {
    xxh32(bytes, HASH_SEED)
}
