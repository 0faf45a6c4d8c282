//! End-to-end engine tests.
//!
//! These cover the full snapshot → restore → purge lifecycle over a real
//! filesystem, including the literal on-disk layouts, corruption handling
//! in both integrity modes, and retention policies. Unit tests in the
//! member crates cover the formats and file operations in isolation.

#[path = "../common/mod.rs"]
mod common;

mod integrity;
mod lifecycle;
