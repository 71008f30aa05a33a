//! Error types for the node's external collaborators.
//!
//! None of these ever reach an HTTP response: sensor errors degrade to
//! unavailable measurements, link and clock errors are logged and retried on
//! the next cadence.

use thiserror::Error;

/// A sensor driver could not produce a reading.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The sensor did not answer within its protocol window.
    #[error("sensor on pin {0} timed out")]
    Timeout(u8),

    /// The sensor answered with a corrupted frame.
    #[error("sensor on pin {0} returned a bad checksum")]
    Checksum(u8),
}

/// Network attachment failed.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No attachment within the configured bound.
    #[error("attach timed out after {0} ms")]
    Timeout(u64),

    /// The link refused or dropped the attempt.
    #[error("attach failed: {0}")]
    Failed(String),
}

/// Wall-clock synchronization failed.
#[derive(Debug, Error)]
pub enum ClockError {
    /// The time service could not be reached.
    #[error("time server unreachable: {0}")]
    Unreachable(String),

    /// The time service answered without a usable time.
    #[error("time server response unusable: {0}")]
    BadResponse(String),
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        LinkError::Failed(err.to_string())
    }
}

impl From<reqwest::Error> for ClockError {
    fn from(err: reqwest::Error) -> Self {
        ClockError::Unreachable(err.to_string())
    }
}
