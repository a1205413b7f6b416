use std::sync::Arc;

use bytes::BytesMut;
use dmxlink_transport::{SerialLink, TransportError};
use tracing::{debug, info, warn};

use crate::buffer::FrameBuffer;
use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::signal::WorkerSignal;
use crate::slot::{FRAME_SIZE, NULL_START_CODE};
use crate::stats::LinkStats;
use crate::timing::TimingConfig;

/// Transmit worker: repeats break, mark-after-break, start code and a
/// snapshot of the send universe.
///
/// The send universe is copied once per cycle before the break. No lock is
/// held across line timing or a blocking wait.
pub struct Transmitter<L> {
    link: L,
    buffers: Arc<FrameBuffer>,
    stats: Arc<LinkStats>,
    timing: TimingConfig,
    start_code: u8,
    buf: BytesMut,
}

impl<L: SerialLink> Transmitter<L> {
    /// Create a transmitter over an already configured link, with default
    /// timing and the null start code.
    pub fn new(link: L, buffers: Arc<FrameBuffer>, stats: Arc<LinkStats>) -> Self {
        Self {
            link,
            buffers,
            stats,
            timing: TimingConfig::default(),
            start_code: NULL_START_CODE,
            buf: BytesMut::with_capacity(FRAME_SIZE),
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Start code sent ahead of every universe. Passed through unmodified.
    pub fn with_start_code(mut self, start_code: u8) -> Self {
        self.start_code = start_code;
        self
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn start_code(&self) -> u8 {
        self.start_code
    }

    /// Run one transmit cycle, without the trailing inter-frame gap.
    pub fn send_frame(&mut self) -> Result<()> {
        self.wait_idle()?;

        let frame = Frame::new(self.start_code, self.buffers.send_snapshot());
        self.buf.clear();
        frame.encode(&mut self.buf);

        self.link.set_break(true)?;
        self.link.hold(self.timing.break_time);
        self.link.set_break(false)?;
        self.link.hold(self.timing.mark_after_break);

        self.link.write_all(&self.buf)?;
        self.wait_idle()?;
        self.stats.record_sent();
        Ok(())
    }

    // A wedged transmitter is reported and counted; the cycle carries on.
    fn wait_idle(&mut self) -> Result<()> {
        match self.link.wait_tx_done(self.timing.tx_done_timeout) {
            Ok(()) => Ok(()),
            Err(TransportError::TxTimeout(waited)) => {
                self.stats.record_tx_timeout();
                warn!(waited_ms = waited.as_millis() as u64, "transmit-complete wait timed out");
                Ok(())
            }
            Err(err) => Err(FrameError::Link(err)),
        }
    }

    /// Transmit until `signal` requests a stop or the link closes, then hand
    /// the link back.
    pub fn run(mut self, signal: &WorkerSignal) -> L {
        info!(
            start_code = self.start_code,
            break_us = self.timing.break_time.as_micros() as u64,
            mark_us = self.timing.mark_after_break.as_micros() as u64,
            gap_ms = self.timing.inter_frame_gap.as_millis() as u64,
            "transmitter started"
        );
        while !signal.should_stop() {
            match self.send_frame() {
                Ok(()) => {}
                Err(FrameError::Link(TransportError::Closed)) => {
                    warn!("link closed; transmitter exiting");
                    break;
                }
                Err(err) => {
                    warn!(%err, "transmit cycle failed");
                    // Never leave the line parked in break after a failed cycle.
                    if let Err(err) = self.link.set_break(false) {
                        debug!(%err, "break release failed");
                    }
                }
            }
            self.link.hold(self.timing.inter_frame_gap);
        }
        info!(frames = self.stats.frames_sent(), "transmitter stopped");
        self.link
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &L {
        &self.link
    }

    /// Consume the transmitter and return the link.
    pub fn into_inner(self) -> L {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use dmxlink_transport::{LinkConfig, SimLink};

    use super::*;
    use crate::slot::UNIVERSE_SIZE;
    use crate::timing::{MIN_BREAK, MIN_MARK_AFTER_BREAK};

    fn setup() -> (SimLink, Arc<FrameBuffer>, Arc<LinkStats>) {
        let mut link = SimLink::new();
        link.configure(&LinkConfig::dmx(17, 18)).unwrap();
        (
            link,
            Arc::new(FrameBuffer::new()),
            Arc::new(LinkStats::new()),
        )
    }

    fn run_until_sent(tx: Transmitter<SimLink>, stats: &LinkStats, frames: u64) -> SimLink {
        let signal = Arc::new(WorkerSignal::new());
        let worker = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || tx.run(&signal))
        };
        let deadline = Instant::now() + Duration::from_secs(10);
        while stats.frames_sent() < frames {
            assert!(Instant::now() < deadline, "transmitter too slow");
            thread::sleep(Duration::from_millis(2));
        }
        signal.request_stop();
        worker.join().unwrap()
    }

    #[test]
    fn frames_on_the_wire_meet_protocol_timing() {
        let (link, buffers, stats) = setup();
        buffers.write_channel(6, 255).unwrap();
        let tx = Transmitter::new(link.clone(), Arc::clone(&buffers), Arc::clone(&stats));

        run_until_sent(tx, &stats, 3);

        let frames = link.captured_frames();
        assert!(frames.len() >= 3);
        for (i, frame) in frames.iter().enumerate() {
            assert!(frame.break_time >= MIN_BREAK, "frame {i}: {:?}", frame.break_time);
            assert!(frame.mark_after_break >= MIN_MARK_AFTER_BREAK);
            assert_eq!(frame.start_code, 0x00);
            assert_eq!(frame.slots.len(), UNIVERSE_SIZE);
            assert_eq!(frame.slots[5], 255);
            assert_eq!(frame.slots.iter().filter(|v| **v != 0).count(), 1);
            if i > 0 {
                assert!(frame.gap_before.unwrap() >= Duration::from_millis(10));
            }
        }
        assert!(frames[..frames.len() - 1].iter().all(|f| f.completed));
        assert!(!link.is_break_asserted());
    }

    #[test]
    fn configured_start_code_is_sent() {
        let (link, buffers, stats) = setup();
        let mut tx = Transmitter::new(link.clone(), buffers, stats).with_start_code(0x17);
        tx.send_frame().unwrap();

        let frames = link.captured_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].start_code, 0x17);
    }

    #[test]
    fn custom_timing_is_honored() {
        let (link, buffers, stats) = setup();
        let timing = TimingConfig {
            break_time: Duration::from_micros(400),
            mark_after_break: Duration::from_micros(100),
            ..TimingConfig::default()
        };
        let mut tx = Transmitter::new(link.clone(), buffers, stats).with_timing(timing);
        tx.send_frame().unwrap();

        let frame = &link.captured_frames()[0];
        assert!(frame.break_time >= Duration::from_micros(400));
        assert!(frame.mark_after_break >= Duration::from_micros(100));
    }

    #[test]
    fn later_writes_reach_the_next_cycle() {
        let (link, buffers, stats) = setup();
        let mut tx = Transmitter::new(link.clone(), Arc::clone(&buffers), stats);

        tx.send_frame().unwrap();
        buffers.write_channel(1, 42).unwrap();
        tx.send_frame().unwrap();

        let frames = link.captured_frames();
        assert_eq!(frames[0].slots[0], 0);
        assert_eq!(frames[1].slots[0], 42);
    }

    #[test]
    fn stalled_link_is_counted_and_leaves_buffer_intact() {
        let (link, buffers, stats) = setup();
        buffers.write_universe(&[7; 512]).unwrap();
        let before = buffers.send_snapshot();
        link.stall_tx(true);
        let timing = TimingConfig {
            tx_done_timeout: Duration::from_millis(5),
            ..TimingConfig::default()
        };
        let mut tx = Transmitter::new(link.clone(), Arc::clone(&buffers), Arc::clone(&stats))
            .with_timing(timing);

        tx.send_frame().unwrap();

        assert!(stats.snapshot().tx_timeouts >= 1);
        assert_eq!(stats.frames_sent(), 1);
        assert_eq!(buffers.send_snapshot(), before);
        assert!(!link.captured_frames()[0].completed);
    }

    #[test]
    fn unconfigured_link_fails_the_cycle() {
        let buffers = Arc::new(FrameBuffer::new());
        let stats = Arc::new(LinkStats::new());
        let mut tx = Transmitter::new(SimLink::new(), buffers, Arc::clone(&stats));

        let err = tx.send_frame().unwrap_err();
        assert!(matches!(err, FrameError::Link(TransportError::NotConfigured)));
        assert_eq!(stats.frames_sent(), 0);
    }

    #[test]
    fn run_exits_when_link_closes() {
        let (link, buffers, stats) = setup();
        link.close();
        let tx = Transmitter::new(link, buffers, stats);
        let returned = tx.run(&WorkerSignal::new());
        assert!(returned.config().is_some());
    }

    #[test]
    fn concurrent_writes_never_tear_a_transmitted_frame() {
        let (link, buffers, stats) = setup();
        let timing = TimingConfig {
            inter_frame_gap: Duration::from_millis(1),
            ..TimingConfig::default()
        };
        let tx = Transmitter::new(link.clone(), Arc::clone(&buffers), Arc::clone(&stats))
            .with_timing(timing);

        let writing = Arc::new(WorkerSignal::new());
        let writer = {
            let buffers = Arc::clone(&buffers);
            let writing = Arc::clone(&writing);
            thread::spawn(move || {
                let mut generation = 0u32;
                while !writing.should_stop() {
                    let value = (generation % 256) as u8;
                    // Slots 1, 100 and 512 always move together.
                    let mut image = [0u8; 512];
                    image[0] = value;
                    image[99] = value;
                    image[511] = value;
                    buffers.write_universe(&image).unwrap();
                    generation = generation.wrapping_add(1);
                }
            })
        };

        run_until_sent(tx, &stats, 20);
        writing.request_stop();
        writer.join().unwrap();

        for frame in link.captured_frames() {
            let slots = &frame.slots;
            assert_eq!(slots[0], slots[99], "torn frame");
            assert_eq!(slots[0], slots[511], "torn frame");
        }
    }
}
