use std::time::Duration;

use crate::traits::PinId;

/// Errors reported by serial link and GPIO collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The driver rejected a line setting.
    #[error("invalid link setting {setting}: {reason}")]
    Configure {
        setting: &'static str,
        reason: String,
    },

    /// A direction-line operation failed.
    #[error("gpio {pin} failed: {reason}")]
    Gpio { pin: PinId, reason: String },

    /// The link was used before `configure` succeeded.
    #[error("serial link not configured")]
    NotConfigured,

    /// Transmit-complete did not arrive in time.
    #[error("transmit did not complete within {0:?}")]
    TxTimeout(Duration),

    /// An I/O error occurred on the underlying port.
    #[error("serial link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link has been shut down.
    #[error("serial link closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
