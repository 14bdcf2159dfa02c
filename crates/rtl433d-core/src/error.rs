//! Error types for the rtl433d bridge.
//!
//! Errors are split along the taxonomy the coordinator's recovery logic
//! works with:
//!
//! - [`ConfigError`]: rejected configuration. The only category that is
//!   raised synchronously out of construction and never retried.
//! - [`ProcessError`]: failures starting or running the rtl_433 process.
//!   These feed the exponential-backoff reconnect loop and never crash the
//!   coordinator.
//! - [`BridgeError`]: the consolidated error surfaced to the hosting
//!   application, including the "not ready" signal after local retries are
//!   exhausted.
//!
//! Malformed input (bad JSON, unrecognized models, out-of-range fields) is
//! deliberately *not* represented here: it is rejected inside the ingestion
//! path at field or record granularity and logged, never propagated.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors produced while validating a [`BridgeConfig`](crate::config::BridgeConfig).
///
/// All variants carry enough context for an actionable message; setup is
/// expected to block entirely on any of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Device selector is not a plain numeric index.
    #[error("invalid device id {0:?}: expected a numeric RTL-SDR index such as \"0\"")]
    InvalidDeviceId(String),

    /// Frequency string does not match `<digits>[.<digits>][M]`.
    #[error("invalid frequency {0:?}: expected e.g. \"433.92M\" or \"868M\"")]
    InvalidFrequency(String),

    /// Gain outside the supported 0..=50 range.
    #[error("invalid gain {0}: must be between 0 and 50")]
    InvalidGain(u32),

    /// A protocol filter entry does not name a known device model.
    #[error("unknown model {entry:?} in protocol filter: not a supported rtl_433 model")]
    UnknownProtocol {
        /// The offending filter entry, verbatim.
        entry: String,
    },
}

// =============================================================================
// Process Errors
// =============================================================================

/// Failures around the external rtl_433 process lifecycle.
///
/// Each variant maps to a stable failure class consumed by the coordinator's
/// backoff policy; none of them are fatal to the bridge itself.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The rtl_433 binary could not be spawned (missing binary, permissions).
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The device self-test did not pass within the attempt budget.
    #[error("device preflight failed after {attempts} attempts: {reason}")]
    PreflightFailed {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last observed failure reason.
        reason: String,
    },
}

/// Runtime failure classes reported by the supervisor's reader tasks.
///
/// These arrive while the process is nominally running, via stderr matching
/// or an unexpected end-of-stream, and always trigger teardown plus a
/// backoff-governed reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The SDR device is claimed by another process (`usb_claim_interface
    /// error`, `device or resource busy`).
    DeviceBusy,
    /// The configured device index does not exist (`device not found`).
    DeviceNotFound,
    /// stdout or stderr reached end-of-stream outside of shutdown.
    UnexpectedExit,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::DeviceBusy => "device busy",
            FailureKind::DeviceNotFound => "device not found",
            FailureKind::UnexpectedExit => "unexpected exit",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Bridge Errors
// =============================================================================

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Consolidated error type surfaced to the hosting application.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid configuration; fails fast at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// rtl_433 process lifecycle failure.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The bridge has no live rtl_433 connection and local retries are
    /// exhausted; the host should present "not ready" until backoff succeeds.
    #[error("bridge not ready: no rtl_433 connection after {attempts} refresh attempts")]
    NotReady {
        /// Refresh attempts made before surfacing the failure.
        attempts: u32,
    },

    /// The coordinator has been shut down.
    #[error("bridge is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_offending_filter_entry() {
        let err = ConfigError::UnknownProtocol {
            entry: "Invalid-Model".to_string(),
        };
        assert!(err.to_string().contains("Invalid-Model"));
    }

    #[test]
    fn failure_kind_labels_are_stable() {
        assert_eq!(FailureKind::DeviceBusy.to_string(), "device busy");
        assert_eq!(FailureKind::DeviceNotFound.to_string(), "device not found");
        assert_eq!(FailureKind::UnexpectedExit.to_string(), "unexpected exit");
    }
}
