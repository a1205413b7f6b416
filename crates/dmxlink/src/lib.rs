//! DMX512 link-layer engine.
//!
//! dmxlink drives a single DMX512 universe over a half-duplex serial link:
//! break and mark-after-break generation, tear-free universe buffers shared
//! with application threads, and a receive decoder that rebuilds a universe
//! from line events.
//!
//! # Crate Structure
//!
//! - [`transport`] — Serial link and direction-line traits, plus a simulated backend
//! - [`frame`] — Universes, frame timing, the transmitter and the receive decoder
//! - [`controller`] — Mode selection and worker ownership (behind `controller` feature)

/// Re-export transport types.
pub mod transport {
    pub use dmxlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use dmxlink_frame::*;
}

/// Re-export controller types (requires `controller` feature).
#[cfg(feature = "controller")]
pub mod controller {
    pub use dmxlink_controller::*;
}
