//! Link control for DMX512.
//!
//! [`LinkController`] owns one serial link, one direction line and the shared
//! universes. It runs at most one worker at a time (transmitter or receiver)
//! and exposes the channel read/write API to application threads.

pub mod config;
pub mod controller;
pub mod error;

pub use config::{ControllerConfig, Pinout};
pub use controller::{LinkController, Mode};
pub use error::{ControllerError, Result};
