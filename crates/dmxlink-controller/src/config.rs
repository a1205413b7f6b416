use std::time::Duration;

use dmxlink_frame::{TimingConfig, NULL_START_CODE};
use dmxlink_transport::PinId;
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// Pins used by the link. All three must be set before a worker starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pinout {
    /// UART transmit pin.
    pub tx: Option<PinId>,
    /// UART receive pin.
    pub rx: Option<PinId>,
    /// RS-485 driver-enable line: high transmits, low receives.
    pub direction: Option<PinId>,
}

impl Pinout {
    /// Reference board wiring: TX 17, RX 18, direction 1.
    pub const REFERENCE: Self = Self::new(17, 18, 1);

    pub const fn new(tx: PinId, rx: PinId, direction: PinId) -> Self {
        Self {
            tx: Some(tx),
            rx: Some(rx),
            direction: Some(direction),
        }
    }

    /// Resolve `(tx, rx, direction)`, failing on unset or clashing pins.
    pub fn require(&self) -> Result<(PinId, PinId, PinId)> {
        let missing = |name: &str| ControllerError::Configuration(format!("{name} pin is not set"));
        let tx = self.tx.ok_or_else(|| missing("tx"))?;
        let rx = self.rx.ok_or_else(|| missing("rx"))?;
        let direction = self.direction.ok_or_else(|| missing("direction"))?;
        if direction == tx || direction == rx {
            return Err(ControllerError::Configuration(format!(
                "direction pin {direction} is also used as a UART pin"
            )));
        }
        Ok((tx, rx, direction))
    }
}

/// Everything a [`crate::LinkController`] needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub pinout: Pinout,
    pub timing: TimingConfig,
    /// Start code sent ahead of every transmitted universe.
    pub start_code: u8,
    /// Bound on each receive wait between stop and flush checks.
    pub event_poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pinout: Pinout::default(),
            timing: TimingConfig::default(),
            start_code: NULL_START_CODE,
            event_poll_interval_ms: 50,
        }
    }
}

impl ControllerConfig {
    /// Default settings on the reference board wiring.
    pub fn reference() -> Self {
        Self {
            pinout: Pinout::REFERENCE,
            ..Self::default()
        }
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms.max(1))
    }

    /// Check everything `start` depends on.
    pub fn validate(&self) -> Result<(PinId, PinId, PinId)> {
        let pins = self.pinout.require()?;
        self.timing
            .validate()
            .map_err(|err| ControllerError::Configuration(err.to_string()))?;
        Ok(pins)
    }
}
