//! Serial link abstraction for DMX512.
//!
//! The DMX engine never touches a UART or a GPIO register directly. It talks
//! to two collaborator traits defined here:
//! - [`SerialLink`] for byte TX/RX, break generation and inbound events
//! - [`DirectionControl`] for the half-duplex direction line
//!
//! This is the lowest layer of dmxlink. The [`sim`] module provides an
//! instrumented in-memory implementation of both traits.

pub mod error;
pub mod sim;
pub mod traits;

pub use error::{Result, TransportError};
pub use sim::{
    frames_from_activity, ActivityRecord, CapturedFrame, LineActivity, SimLink, SimPins,
    DEFAULT_ACTIVITY_LIMIT,
};
pub use traits::{
    DirectionControl, LinkConfig, LinkEvent, Parity, PinId, SerialLink, StopBits,
};
