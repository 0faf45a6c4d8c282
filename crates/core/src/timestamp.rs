//! Generation names
//!
//! Generations are directories named by their creation time,
//! `YYYY-MM-DD HH:MM:SS`, zero-padded so that lexicographic order equals
//! chronological order. Selection of the "latest" and "oldest" generation
//! relies on that property. Historical deployments minted a variant with a
//! trailing `:MICROS` field; the parser accepts it, the minter never
//! produces it.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// strftime format of a generation directory name.
pub const GENERATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of the fixed, second-resolution part of a generation name.
const GENERATION_BASE_LEN: usize = 19;

/// Mint a generation directory name from a wall-clock reading.
pub fn mint_generation_name(now: DateTime<Utc>) -> String {
    now.format(GENERATION_FORMAT).to_string()
}

/// Parse a generation directory name back into its timestamp.
///
/// Returns `None` for anything that is not a generation name; directory
/// scans use this to tell generations apart from foreign entries.
pub fn parse_generation_name(name: &str) -> Option<DateTime<Utc>> {
    let base = name.get(..GENERATION_BASE_LEN)?;
    match &name[GENERATION_BASE_LEN..] {
        "" => {}
        rest => {
            // historical `:MICROS` suffix; sub-second precision is ignored
            let micros = rest.strip_prefix(':')?;
            if micros.is_empty() || !micros.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
        }
    }

    let naive = NaiveDateTime::parse_from_str(base, GENERATION_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Age of a generation in whole seconds, measured at `now`.
///
/// Clamped at zero for generations minted in the future (clock skew).
pub fn age_seconds(minted: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(minted).num_seconds().max(0) as u64
}
