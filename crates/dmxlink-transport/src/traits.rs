use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Result, TransportError};

/// GPIO number as understood by the board's pin multiplexer.
pub type PinId = u8;

/// UART parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// UART stop-bit setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

/// Line settings applied to a [`SerialLink`] before a worker starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub tx_pin: PinId,
    pub rx_pin: PinId,
}

impl LinkConfig {
    /// DMX512 line rate.
    pub const DMX_BAUD_RATE: u32 = 250_000;

    /// 250000 baud, 8 data bits, no parity, 2 stop bits on the given pins.
    pub fn dmx(tx_pin: PinId, rx_pin: PinId) -> Self {
        Self {
            baud_rate: Self::DMX_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::Two,
            tx_pin,
            rx_pin,
        }
    }

    /// Time on the wire for a single character (start bit, data, parity, stop).
    pub fn char_time(&self) -> Duration {
        let parity_bits = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        let bits = 1 + u64::from(self.data_bits) + parity_bits + stop_bits;
        Duration::from_nanos(bits * 1_000_000_000 / u64::from(self.baud_rate.max(1)))
    }
}

/// One delivery from the inbound side of the link.
///
/// Condition events carry no payload. `Data` carries the run of bytes the
/// driver had buffered when it raised the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Break,
    Data(Bytes),
    FrameError,
    ParityError,
    Overflow,
    BufferFull,
}

impl LinkEvent {
    /// Convenience constructor for a data run.
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::Data(bytes.into())
    }

    /// True for line faults that invalidate the frame in progress.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::FrameError | Self::ParityError | Self::Overflow | Self::BufferFull
        )
    }

    /// Short name used in logs and capture scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Data(_) => "data",
            Self::FrameError => "frame-error",
            Self::ParityError => "parity-error",
            Self::Overflow => "overflow",
            Self::BufferFull => "buffer-full",
        }
    }
}

/// Byte-level serial port with break generation and an inbound event stream.
///
/// Implementations wrap a UART driver. All methods may block; none of them is
/// ever called while the caller holds a frame-buffer lock.
pub trait SerialLink: Send {
    /// Apply line settings and pin routing.
    fn configure(&mut self, config: &LinkConfig) -> Result<()>;

    /// Queue bytes for transmission, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Drive the TX line into (or out of) the break condition by inverting it.
    fn set_break(&mut self, asserted: bool) -> Result<()>;

    /// Block until every queued byte has left the shift register.
    fn wait_tx_done(&mut self, timeout: Duration) -> Result<()>;

    /// Wait up to `timeout` for the next inbound event.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<LinkEvent>>;

    /// Discard any buffered inbound bytes.
    fn flush_input(&mut self) -> Result<()>;

    /// Keep the line in its current condition for `duration`.
    ///
    /// The default sleeps the calling thread, which never undershoots.
    /// Drivers with a microsecond busy-wait should override it.
    fn hold(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Write the whole buffer, retrying short and interrupted writes.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// The single output line that switches an RS-485 transceiver between
/// driving and listening.
pub trait DirectionControl: Send {
    /// Configure `pin` as a push-pull output.
    fn set_output(&mut self, pin: PinId) -> Result<()>;

    /// Drive `pin` high (transmit) or low (receive).
    fn set_level(&mut self, pin: PinId, high: bool) -> Result<()>;
}
