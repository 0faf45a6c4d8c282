//! The Snapper engine
//!
//! A generational snapshot engine over a hierarchical filesystem. Payloads
//! are persisted as reference-counted backlink files, deduplicated across
//! generations; each committed generation carries an `archive` manifest
//! binding client keys to backlink paths.
//!
//! The engine is a small state machine (Dormant / Creation / Restoration /
//! Purge) owned by the host as a plain value. It is single-writer and
//! internally single-threaded: one operation runs to completion before the
//! next dispatches. Any operation called in the wrong state returns
//! [`snapper_core::Error::InvalidState`] and changes nothing.
//!
//! # Lifecycle
//!
//! ```text
//!              init_snapshot                    commit_snapshot
//!   Dormant ───────────────────▶ Creation ───────────────────▶ Dormant
//!      │                           │  ▲
//!      │                           └──┘ take_snapshot
//!      │  open_generation                      close_generation
//!      ├───────────────────────▶ Restoration ─────────────────▶ Dormant
//!      │                           │  ▲
//!      │                           └──┘ restore
//!      │  purge / purge_expired / purge_zombies
//!      └───────────────────────▶ Purge ───────────────────────▶ Dormant
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod purge;

pub use engine::{InitOutcome, Snapper, State};
