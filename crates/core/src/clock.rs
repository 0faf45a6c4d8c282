//! Wall-clock seam
//!
//! The engine only reads the clock to mint generation names and to age
//! generations for expiry. Hiding that behind a trait keeps both behaviors
//! testable without sleeping in tests.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
