use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dmxlink_frame::{
    DecoderState, FrameBuffer, LinkStats, Receiver, StatsSnapshot, TimingConfig, Transmitter,
    Universe, WorkerSignal,
};
use dmxlink_transport::{DirectionControl, LinkConfig, PinId, SerialLink, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, Pinout};
use crate::error::{ControllerError, Result};

/// Link direction. The link is half-duplex, so exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Transmit,
    Receive,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transmit => "transmit",
            Self::Receive => "receive",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            Self::Transmit => "dmx-tx",
            Self::Receive => "dmx-rx",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Running<L> {
    signal: Arc<WorkerSignal>,
    handle: JoinHandle<L>,
}

/// The single active worker. A running worker owns the link and hands it
/// back when joined.
enum Worker<L> {
    Stopped,
    Transmit(Running<L>),
    Receive(Running<L>),
}

/// Owns a serial link, its direction line and both universes.
///
/// Buffer accessors take `&self` and are safe to call from any thread through
/// a shared reference; mode changes take `&mut self`.
pub struct LinkController<L: SerialLink + 'static, G: DirectionControl> {
    config: ControllerConfig,
    link: Option<L>,
    gpio: G,
    worker: Worker<L>,
    buffers: Arc<FrameBuffer>,
    stats: Arc<LinkStats>,
}

impl<L: SerialLink + 'static, G: DirectionControl> LinkController<L, G> {
    /// Create a stopped controller with default settings and unset pins.
    pub fn new(link: L, gpio: G) -> Self {
        Self::with_config(link, gpio, ControllerConfig::default())
    }

    /// Create a stopped controller with explicit settings.
    pub fn with_config(link: L, gpio: G, config: ControllerConfig) -> Self {
        Self {
            config,
            link: Some(link),
            gpio,
            worker: Worker::Stopped,
            buffers: Arc::new(FrameBuffer::new()),
            stats: Arc::new(LinkStats::new()),
        }
    }

    /// Set the pins used by the next [`LinkController::start`].
    pub fn configure(&mut self, pinout: Pinout) {
        debug!(tx = ?pinout.tx, rx = ?pinout.rx, direction = ?pinout.direction, "pinout set");
        self.config.pinout = pinout;
    }

    /// Timing used by the next transmitter started.
    pub fn set_timing(&mut self, timing: TimingConfig) -> Result<()> {
        timing
            .validate()
            .map_err(|err| ControllerError::Configuration(err.to_string()))?;
        self.config.timing = timing;
        Ok(())
    }

    /// Start code used by the next transmitter started. Passed through
    /// unmodified; `0x00` is standard dimmer data.
    pub fn set_start_code(&mut self, start_code: u8) {
        self.config.start_code = start_code;
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Configure the link at 250000-8N2, set the direction line and launch
    /// the worker for `mode`, replacing any running worker.
    ///
    /// Configuration is checked before the running worker is touched.
    /// On a driver failure nothing is running afterwards and the link stays
    /// with the controller for the next attempt.
    pub fn start(&mut self, mode: Mode) -> Result<()> {
        let (tx_pin, rx_pin, direction_pin) = self.config.validate()?;

        self.stop()?;
        let mut link = self.link.take().ok_or(ControllerError::LinkUnavailable)?;

        if let Err(err) = self.prepare(&mut link, mode, tx_pin, rx_pin, direction_pin) {
            warn!(%mode, %err, "link setup failed; worker not started");
            self.link = Some(link);
            return Err(err.into());
        }

        let signal = Arc::new(WorkerSignal::new());
        let worker_signal = Arc::clone(&signal);
        let buffers = Arc::clone(&self.buffers);
        let stats = Arc::clone(&self.stats);
        let spawned = match mode {
            Mode::Transmit => {
                let tx = Transmitter::new(link, buffers, stats)
                    .with_timing(self.config.timing)
                    .with_start_code(self.config.start_code);
                thread::Builder::new()
                    .name(mode.thread_name().to_string())
                    .spawn(move || tx.run(&worker_signal))
            }
            Mode::Receive => {
                let rx = Receiver::new(link, buffers, stats)
                    .with_poll_interval(self.config.event_poll_interval());
                thread::Builder::new()
                    .name(mode.thread_name().to_string())
                    .spawn(move || rx.run(&worker_signal))
            }
        };
        // A failed spawn drops the closure, and the link with it.
        let handle = spawned.map_err(|err| ControllerError::Driver(TransportError::Io(err)))?;

        let running = Running { signal, handle };
        self.worker = match mode {
            Mode::Transmit => Worker::Transmit(running),
            Mode::Receive => Worker::Receive(running),
        };
        info!(%mode, tx_pin, rx_pin, direction_pin, "link worker started");
        Ok(())
    }

    fn prepare(
        &mut self,
        link: &mut L,
        mode: Mode,
        tx_pin: PinId,
        rx_pin: PinId,
        direction_pin: PinId,
    ) -> dmxlink_transport::Result<()> {
        link.configure(&LinkConfig::dmx(tx_pin, rx_pin))?;
        self.gpio.set_output(direction_pin)?;
        self.gpio.set_level(direction_pin, mode == Mode::Transmit)?;
        if mode == Mode::Receive {
            link.flush_input()?;
        }
        Ok(())
    }

    /// Stop the running worker, if any, and take the link back.
    pub fn stop(&mut self) -> Result<()> {
        let (mode, running) = match std::mem::replace(&mut self.worker, Worker::Stopped) {
            Worker::Stopped => return Ok(()),
            Worker::Transmit(running) => (Mode::Transmit, running),
            Worker::Receive(running) => (Mode::Receive, running),
        };
        running.signal.request_stop();
        match running.handle.join() {
            Ok(link) => {
                self.link = Some(link);
                info!(%mode, "link worker stopped");
                Ok(())
            }
            Err(_) => {
                warn!(%mode, "link worker panicked; link lost");
                Err(ControllerError::WorkerPanicked(mode.thread_name()))
            }
        }
    }

    /// Active mode, or `None` when stopped.
    pub fn mode(&self) -> Option<Mode> {
        match self.worker {
            Worker::Stopped => None,
            Worker::Transmit(_) => Some(Mode::Transmit),
            Worker::Receive(_) => Some(Mode::Receive),
        }
    }

    /// Replace the leading send slots with `data` (at most 512 bytes).
    pub fn set_universe(&self, data: &[u8]) -> Result<()> {
        Ok(self.buffers.write_universe(data)?)
    }

    /// Set one send slot by 1-based address.
    pub fn set_channel(&self, address: u16, value: u8) -> Result<()> {
        Ok(self.buffers.write_channel(address, value)?)
    }

    /// Copy of the receive universe. All-zero until a frame has arrived.
    pub fn get_universe(&self) -> Universe {
        self.buffers.read_snapshot()
    }

    /// One received slot by 1-based address.
    pub fn get_channel(&self, address: u16) -> Result<u8> {
        Ok(self.buffers.read_channel(address)?)
    }

    /// `count` received slots starting at 1-based `start`.
    pub fn get_range(&self, start: u16, count: u16) -> Result<Vec<u8>> {
        Ok(self.buffers.read_range(start, count)?)
    }

    /// Copy of the send universe as the next cycle would transmit it.
    pub fn send_universe(&self) -> Universe {
        self.buffers.send_snapshot()
    }

    /// Discard buffered inbound link data.
    ///
    /// A running receiver flushes at its next check and restarts at the next
    /// break. With no worker the idle link is flushed directly.
    pub fn reset(&mut self) -> Result<()> {
        match &self.worker {
            Worker::Receive(running) => {
                running.signal.request_flush();
                debug!("receive flush requested");
            }
            Worker::Transmit(_) => debug!("reset while transmitting; no inbound data to flush"),
            Worker::Stopped => {
                let link = self.link.as_mut().ok_or(ControllerError::LinkUnavailable)?;
                link.flush_input()?;
                debug!("idle link flushed");
            }
        }
        Ok(())
    }

    /// Decoder state last published by a receiver. Holds the final state of
    /// the last receive session after a stop; `Idle` before any.
    pub fn receive_state(&self) -> DecoderState {
        self.stats.receive_state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The shared universes, for components that read or write them directly.
    pub fn frame_buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffers
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }
}

impl<L: SerialLink + 'static, G: DirectionControl> Drop for LinkController<L, G> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(%err, "link worker did not stop cleanly");
        }
    }
}
