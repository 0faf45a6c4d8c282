//! Synchronous client boundary for the Snapper engine
//!
//! One client talks to the engine through a shared transport buffer:
//! payloads are copied into the buffer on the way in and restored bytes are
//! copied out of it on the way back, with a single mutex guarding both the
//! buffer and the engine behind it. Requests are synchronous — each call
//! runs the engine operation to completion before returning.
//!
//! There are no locks inside the engine; this mutex is the only one.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod session;

pub use session::{SessionError, SnapperSession};
