//! The mutex-guarded session over an owned engine.

use parking_lot::Mutex;

use snapper_core::{ArchiveKey, Error};
use snapper_engine::{InitOutcome, Snapper};
use thiserror::Error as ThisError;
use tracing::debug;

/// Session-level failures.
///
/// Transport overflow is the only condition the session adds on top of the
/// engine's own errors: the shared buffer has a fixed capacity
/// (`Config::bufsize`) and payloads must fit it whole.
#[derive(Debug, ThisError)]
pub enum SessionError {
    /// The payload or destination exceeds the transport buffer
    #[error("{size} bytes exceed the transport buffer capacity of {capacity}")]
    BufferOverflow {
        /// Requested transfer size
        size: usize,
        /// Capacity of the shared buffer
        capacity: usize,
    },

    /// The engine rejected or failed the operation
    #[error(transparent)]
    Engine(#[from] Error),
}

struct Inner {
    engine: Snapper,
    io: Vec<u8>,
}

/// Single-client boundary around an owned [`Snapper`].
///
/// All operations take `&self`; the internal mutex serializes them. Bytes
/// cross the boundary through the shared buffer, never by reference into
/// client memory.
pub struct SnapperSession {
    inner: Mutex<Inner>,
}

impl SnapperSession {
    /// Wrap an engine, sizing the transport buffer from its configuration.
    pub fn new(engine: Snapper) -> Self {
        let bufsize = engine.config().bufsize;
        debug!(bufsize, "session transport buffer allocated");
        SnapperSession {
            inner: Mutex::new(Inner {
                engine,
                io: vec![0u8; bufsize],
            }),
        }
    }

    /// Recover the engine, consuming the session.
    pub fn into_engine(self) -> Snapper {
        self.inner.into_inner().engine
    }

    /// Begin a snapshot session.
    pub fn init_snapshot(&self) -> Result<InitOutcome, SessionError> {
        Ok(self.inner.lock().engine.init_snapshot()?)
    }

    /// Copy `payload` into the transport buffer and persist it under `key`.
    pub fn take_snapshot(&self, payload: &[u8], key: ArchiveKey) -> Result<(), SessionError> {
        let mut guard = self.inner.lock();
        if payload.len() > guard.io.len() {
            return Err(SessionError::BufferOverflow {
                size: payload.len(),
                capacity: guard.io.len(),
            });
        }
        let Inner { engine, io } = &mut *guard;
        io[..payload.len()].copy_from_slice(payload);
        engine.take_snapshot(&io[..payload.len()], key)?;
        Ok(())
    }

    /// Seal the open session into a generation.
    pub fn commit_snapshot(&self) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.commit_snapshot()?)
    }

    /// Open a generation (the latest valid one if unnamed) for reads.
    pub fn open_generation(&self, name: Option<&str>) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.open_generation(name)?)
    }

    /// Restore the payload for `key` into `dest` via the transport buffer.
    ///
    /// Returns the payload length; `dest` beyond it is zeroed.
    pub fn restore(&self, dest: &mut [u8], key: ArchiveKey) -> Result<usize, SessionError> {
        let mut guard = self.inner.lock();
        if dest.len() > guard.io.len() {
            return Err(SessionError::BufferOverflow {
                size: dest.len(),
                capacity: guard.io.len(),
            });
        }
        let Inner { engine, io } = &mut *guard;
        let size = engine.restore(&mut io[..dest.len()], key)?;
        dest.copy_from_slice(&io[..dest.len()]);
        Ok(size)
    }

    /// End the restoration.
    pub fn close_generation(&self) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.close_generation()?)
    }

    /// Release one generation (the oldest valid one if unnamed).
    pub fn purge(&self, name: Option<&str>) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.purge(name)?)
    }

    /// Enforce quota and age retention policies.
    pub fn purge_expired(&self) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.purge_expired()?)
    }

    /// Reclaim generations without a valid archive.
    pub fn purge_zombies(&self) -> Result<(), SessionError> {
        Ok(self.inner.lock().engine.purge_zombies()?)
    }
}
