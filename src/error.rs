//! Error types for the GATT inspector
//! Only connect-time precondition failures reach the caller; everything that
//! happens after the open request is absorbed into state and queue progression.

use thiserror::Error;

/// Errors surfaced to callers of the public API
#[derive(Debug, Error)]
pub enum Error {
    /// The local radio is missing or switched off
    #[error("Bluetooth adapter is not available or disabled")]
    TransportUnavailable,

    /// The transport refused to open a link to the given address
    #[error("Failed to open connection to {address}: {reason}")]
    OpenFailed { address: String, reason: String },

    /// The connection task has stopped and no longer accepts commands
    #[error("Connection manager is no longer running")]
    ManagerClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
