//! Protocol stack configuration parameters
//!
//! All tunable parameters for the streaming decoder and RPC pipeline.
//! Values can be loaded from JSON (host tools) or postcard (persisted
//! sessions).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Core stack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    // --- Streaming ---
    /// Initial size of the report decoder's circular buffer (bytes)
    pub stream_buffer_size: usize,
    /// Let the circular buffer double when a chunk does not fit
    pub stream_buffer_autoexpand: bool,
    /// Progress event granularity (percentage points)
    pub progress_interval_percent: u8,
    /// Silence after which an in-progress report counts as stalled (ms)
    pub stall_threshold_ms: u32,
    /// Try to reorder packets of reports whose signature fails
    pub repair_out_of_order: bool,

    // --- RPC ---
    /// Hard limit on waiting for a response header (seconds)
    pub rpc_watchdog_secs: u32,
    /// Caller timeout used when none is given; only logged when exceeded (ms)
    pub rpc_default_timeout_ms: u32,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            // Streaming
            stream_buffer_size: 32 * 1024,
            stream_buffer_autoexpand: true,
            progress_interval_percent: 5,
            stall_threshold_ms: 1000,
            repair_out_of_order: true,

            // RPC
            rpc_watchdog_secs: 15,
            rpc_default_timeout_ms: 1000,
        }
    }
}

impl StackConfig {
    /// Decode a persisted configuration and validate it.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, Error> {
        let config: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::Config("malformed postcard config"))?;
        config.validate()?;
        Ok(config)
    }

    /// Encode for persistence alongside a session.
    pub fn to_postcard(&self) -> Result<Vec<u8>, Error> {
        postcard::to_allocvec(self).map_err(|_| Error::Config("config does not encode"))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.stream_buffer_size == 0 {
            return Err(Error::Config("stream_buffer_size must be non-zero"));
        }
        if self.progress_interval_percent == 0 || self.progress_interval_percent > 100 {
            return Err(Error::Config("progress_interval_percent must be in 1..=100"));
        }
        if self.stall_threshold_ms == 0 {
            return Err(Error::Config("stall_threshold_ms must be non-zero"));
        }
        if self.rpc_watchdog_secs == 0 {
            return Err(Error::Config("rpc_watchdog_secs must be non-zero"));
        }
        Ok(())
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(u64::from(self.stall_threshold_ms))
    }

    pub fn rpc_watchdog(&self) -> Duration {
        Duration::from_secs(u64::from(self.rpc_watchdog_secs))
    }

    pub fn rpc_default_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.rpc_default_timeout_ms))
    }
}
