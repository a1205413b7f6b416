//! Transmit timing.
//!
//! The protocol only fixes minimums (break >= 88 µs, mark-after-break >= 12 µs).
//! The defaults below are comfortably above them and are configurable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::slot::FRAME_SIZE;

/// Shortest break a receiver must accept.
pub const MIN_BREAK: Duration = Duration::from_micros(88);

/// Shortest mark-after-break a receiver must accept.
pub const MIN_MARK_AFTER_BREAK: Duration = Duration::from_micros(12);

/// One slot at 250 kbaud, 8N2: 11 bits of 4 µs.
pub const SLOT_TIME: Duration = Duration::from_micros(44);

/// Default break length.
pub const DEFAULT_BREAK: Duration = Duration::from_micros(250);

/// Default mark-after-break length.
pub const DEFAULT_MARK_AFTER_BREAK: Duration = Duration::from_micros(20);

/// Default idle time between the end of one frame and the next break.
pub const DEFAULT_INTER_FRAME_GAP: Duration = Duration::from_millis(10);

/// Default bound on waiting for transmit-complete.
pub const DEFAULT_TX_DONE_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing of one transmit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Break duration.
    #[serde(rename = "break_us", with = "micros")]
    pub break_time: Duration,
    /// Mark-after-break duration.
    #[serde(rename = "mark_after_break_us", with = "micros")]
    pub mark_after_break: Duration,
    /// Idle gap after transmit-complete, before the next break.
    #[serde(rename = "inter_frame_gap_ms", with = "millis")]
    pub inter_frame_gap: Duration,
    /// Bound on each wait for transmit-complete. Expiry is logged, not fatal.
    #[serde(rename = "tx_done_timeout_ms", with = "millis")]
    pub tx_done_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            break_time: DEFAULT_BREAK,
            mark_after_break: DEFAULT_MARK_AFTER_BREAK,
            inter_frame_gap: DEFAULT_INTER_FRAME_GAP,
            tx_done_timeout: DEFAULT_TX_DONE_TIMEOUT,
        }
    }
}

impl TimingConfig {
    /// Reject settings a compliant receiver could misread.
    pub fn validate(&self) -> Result<()> {
        if self.break_time < MIN_BREAK {
            return Err(FrameError::InvalidTiming(format!(
                "break {:?} is shorter than the {:?} minimum",
                self.break_time, MIN_BREAK
            )));
        }
        if self.mark_after_break < MIN_MARK_AFTER_BREAK {
            return Err(FrameError::InvalidTiming(format!(
                "mark-after-break {:?} is shorter than the {:?} minimum",
                self.mark_after_break, MIN_MARK_AFTER_BREAK
            )));
        }
        if self.tx_done_timeout.is_zero() {
            return Err(FrameError::InvalidTiming(
                "transmit-complete timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Wire time of the start code and 512 slots.
    pub fn data_time(&self) -> Duration {
        SLOT_TIME * FRAME_SIZE as u32
    }

    /// Nominal time from one break to the next.
    pub fn frame_period(&self) -> Duration {
        self.break_time + self.mark_after_break + self.data_time() + self.inter_frame_gap
    }

    /// Nominal frames per second.
    pub fn refresh_rate(&self) -> f64 {
        1.0 / self.frame_period().as_secs_f64()
    }
}

mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
