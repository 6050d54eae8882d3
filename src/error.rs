//! Custom error types for the monitor.
//!
//! This module defines the primary error type, `MonitorError`, for the whole
//! crate. Using the `thiserror` crate, it provides a single place where the
//! different failure classes of an unattended monitoring rig are told apart:
//!
//! - **Communication faults** (`Bridge`, `MalformedResponse`, `Timeout`):
//!   the instrument was unreachable, dropped the connection, answered
//!   garbage, or never reported completion. These are expected during long
//!   unattended runs and are retried at whole-cycle granularity by the
//!   acquisition loop.
//! - **`Overload`**: the bridge flagged a channel reading as out of range.
//!   The reading is discarded; nothing is retried and nothing is persisted
//!   for that readback.
//! - **Configuration errors** (`Config`, `Configuration`, `UnknownRig`,
//!   `ChannelOutOfRange`): programmer or operator mistakes. These abort
//!   startup instead of being swallowed by the retry loop.
//! - **`Io`**: persistence failures. Retried like communication faults —
//!   a full disk must not kill a rig that may recover it.
//!
//! The split is encoded in [`MonitorError::is_recoverable`], which the
//! acquisition loop consults to decide between backoff-and-retry and
//! propagation.

use crate::registry::Rig;
use crate::scan::ScanPhase;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// All failure conditions the monitor distinguishes.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration file or environment could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or directory I/O failure while persisting records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure talking to the resistance bridge.
    #[error("Bridge communication error: {0}")]
    Bridge(String),

    /// The bridge answered, but the response did not parse.
    #[error("Malformed response to `{query}`: {response:?}")]
    MalformedResponse {
        /// Query that produced the response.
        query: String,
        /// Verbatim response text.
        response: String,
    },

    /// An operation-complete poll exceeded its deadline.
    #[error("Timed out after {waited_secs} s in {phase} waiting for the bridge")]
    Timeout {
        /// Protocol phase that was waiting.
        phase: ScanPhase,
        /// Seconds spent polling before giving up.
        waited_secs: u64,
    },

    /// The bridge reported the channel reading as overloaded.
    #[error("Channel {channel} reported overload; reading discarded")]
    Overload {
        /// Channel whose reading was discarded.
        channel: u8,
    },

    /// Rig name did not match any known variant.
    #[error("Unknown rig '{0}' (expected fridge, probe1, probe2 or probe3)")]
    UnknownRig(String),

    /// Channel index outside the selected rig's sensor table.
    #[error("Channel {channel} out of range for rig {rig} ({count} channels)")]
    ChannelOutOfRange {
        /// Rig whose table was consulted.
        rig: Rig,
        /// Offending channel index.
        channel: u8,
        /// Number of channels the table defines.
        count: usize,
    },
}

impl MonitorError {
    /// Whether the acquisition loop should back off and retry after this
    /// error, or propagate it and stop.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::Bridge(_)
            | MonitorError::MalformedResponse { .. }
            | MonitorError::Timeout { .. }
            | MonitorError::Overload { .. }
            | MonitorError::Io(_) => true,
            MonitorError::Config(_)
            | MonitorError::Configuration(_)
            | MonitorError::UnknownRig(_)
            | MonitorError::ChannelOutOfRange { .. } => false,
        }
    }
}
