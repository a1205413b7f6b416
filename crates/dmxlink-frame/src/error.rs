use dmxlink_transport::TransportError;

/// Errors that can occur while accessing universes or driving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An address or range falls outside slots 1-512.
    #[error("slot range out of bounds (start {start}, count {count}, valid addresses 1-512)")]
    OutOfRange { start: usize, count: usize },

    /// A range copy could not be allocated.
    #[error("failed to allocate {requested} bytes for slot copy")]
    Allocation { requested: usize },

    /// A wire image is not a start code plus at most 512 slots.
    #[error("invalid frame length ({0} bytes, expected 1-513)")]
    InvalidLength(usize),

    /// Timing settings fall below protocol minimums.
    #[error("invalid timing: {0}")]
    InvalidTiming(String),

    /// The serial link failed while driving a frame.
    #[error("link error: {0}")]
    Link(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
