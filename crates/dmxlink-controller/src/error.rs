use dmxlink_frame::FrameError;
use dmxlink_transport::TransportError;

/// Errors that can occur while controlling a link.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Pins or timing are missing or invalid. Fix the configuration and retry.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serial or GPIO setup failed; no worker was started.
    #[error("driver error: {0}")]
    Driver(#[from] TransportError),

    /// Buffer access failed (out-of-range address, allocation failure).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A worker thread panicked; its link could not be recovered.
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),

    /// The serial link was lost with a failed worker.
    #[error("serial link unavailable")]
    LinkUnavailable,
}

impl ControllerError {
    /// True for address or range arguments outside 1-512.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::Frame(FrameError::OutOfRange { .. }))
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
