//! Engine configuration
//!
//! Configuration is read once by the host at startup and handed to the
//! engine by value; the engine never mutates it. Parsing an external
//! config source is the host's concern — this struct is the interface.

use thiserror::Error;

/// Snapper engine configuration
///
/// Controls deduplication, integrity handling, directory fan-out, and
/// generation retention.
#[derive(Debug, Clone)]
pub struct Config {
    /// Emit per-decision log lines
    pub verbose: bool,
    /// Reference count at which the next share of a payload creates a
    /// redundant backlink instead of raising the count
    pub redundancy: u8,
    /// true: integrity failures are fatal; false: they surface as error codes
    pub integrity: bool,
    /// Maximum immediate entries in a snapshot directory before an `ext/`
    /// subdirectory is opened
    pub threshold: u64,
    /// Cap on total valid generations; 0 disables the quota
    pub max_snapshots: u64,
    /// Floor of valid generations that purges refuse to cross
    pub min_snapshots: u64,
    /// Seconds after which a generation expires; 0 disables expiry
    pub expiration: u64,
    /// Capacity of the session transport buffer in bytes
    pub bufsize: usize,
}

impl Config {
    /// Default reference count bound before a redundant copy is forced
    pub const DEFAULT_REDUNDANCY: u8 = 3;
    /// Default snapshot directory fan-out bound
    pub const DEFAULT_THRESHOLD: u64 = 100;
    /// Default transport buffer capacity (1 MiB)
    pub const DEFAULT_BUFSIZE: usize = 1024 * 1024;
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbose: false,
            redundancy: Config::DEFAULT_REDUNDANCY,
            integrity: true,
            threshold: Config::DEFAULT_THRESHOLD,
            max_snapshots: 0,
            min_snapshots: 0,
            expiration: 0,
            bufsize: Config::DEFAULT_BUFSIZE,
        }
    }
}

impl Config {
    /// Create config for testing
    ///
    /// Small fan-out threshold and transport buffer for faster tests.
    pub fn for_testing() -> Self {
        Config {
            verbose: true,
            threshold: 8,
            bufsize: 4096,
            ..Default::default()
        }
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the redundancy bound
    pub fn with_redundancy(mut self, redundancy: u8) -> Self {
        self.redundancy = redundancy;
        self
    }

    /// Set integrity mode
    pub fn with_integrity(mut self, integrity: bool) -> Self {
        self.integrity = integrity;
        self
    }

    /// Set the directory fan-out threshold
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the generation quota (0 disables)
    pub fn with_max_snapshots(mut self, max_snapshots: u64) -> Self {
        self.max_snapshots = max_snapshots;
        self
    }

    /// Set the generation floor purges refuse to cross
    pub fn with_min_snapshots(mut self, min_snapshots: u64) -> Self {
        self.min_snapshots = min_snapshots;
        self
    }

    /// Set generation expiry in seconds (0 disables)
    pub fn with_expiration(mut self, expiration: u64) -> Self {
        self.expiration = expiration;
        self
    }

    /// Set the transport buffer capacity
    pub fn with_bufsize(mut self, bufsize: usize) -> Self {
        self.bufsize = bufsize;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redundancy == 0 {
            return Err(ConfigError::RedundancyZero);
        }
        if self.threshold < 2 {
            return Err(ConfigError::ThresholdTooSmall(self.threshold));
        }
        if self.max_snapshots > 0 && self.min_snapshots > self.max_snapshots {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_snapshots,
                max: self.max_snapshots,
            });
        }
        if self.bufsize == 0 {
            return Err(ConfigError::BufsizeZero);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Redundancy must be at least 1 (reference counts are one byte wide)
    #[error("redundancy must be at least 1")]
    RedundancyZero,

    /// Threshold must leave room for one file and one `ext/` entry
    #[error("threshold {0} is too small (minimum 2)")]
    ThresholdTooSmall(u64),

    /// The generation floor cannot exceed the quota
    #[error("min_snapshots {min} exceeds max_snapshots {max}")]
    MinExceedsMax {
        /// Configured floor
        min: u64,
        /// Configured quota
        max: u64,
    },

    /// The transport buffer cannot be empty
    #[error("bufsize must be non-zero")]
    BufsizeZero,
}
