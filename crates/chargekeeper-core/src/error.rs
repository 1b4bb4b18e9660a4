//! Error types shared across the chargekeeper crates.

use thiserror::Error;

/// Result type alias for charge operations.
pub type ChargeResult<T> = Result<T, ChargeError>;

/// Errors surfaced by the command interface and its adapters.
///
/// Hardware communication failures during evaluation are deliberately *not*
/// represented here — they are absorbed by the controller (logged, fail-open)
/// and never reach a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChargeError {
    /// No charge-control hardware binding exists on this device.
    #[error("charge control is not supported on this device")]
    Unsupported,

    /// A percent setter was called with a value outside `0..=100`.
    #[error("level {0} is out of range (expected 0..=100)")]
    OutOfRange(i64),

    /// The settings store rejected a write; cached config was not updated.
    #[error("settings store unavailable: {0}")]
    StoreUnavailable(String),
}
