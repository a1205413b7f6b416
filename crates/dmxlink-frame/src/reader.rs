use std::sync::Arc;
use std::time::Duration;

use dmxlink_transport::{SerialLink, TransportError};
use tracing::{debug, info, trace, warn};

use crate::buffer::FrameBuffer;
use crate::decoder::{DecoderState, FrameOutcome, ReceiverDecoder};
use crate::error::{FrameError, Result};
use crate::signal::WorkerSignal;
use crate::stats::LinkStats;

/// How long one wait for a link event may block before stop and flush
/// requests are checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receive worker: feeds link events through a [`ReceiverDecoder`] into the
/// receive universe of a shared [`FrameBuffer`].
///
/// Never holds the buffer lock while waiting on the link.
pub struct Receiver<L> {
    link: L,
    decoder: ReceiverDecoder,
    buffers: Arc<FrameBuffer>,
    stats: Arc<LinkStats>,
    poll_interval: Duration,
}

impl<L: SerialLink> Receiver<L> {
    /// Create a receiver over an already configured link.
    pub fn new(link: L, buffers: Arc<FrameBuffer>, stats: Arc<LinkStats>) -> Self {
        Self {
            link,
            decoder: ReceiverDecoder::new(),
            buffers,
            stats,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Bound on each blocking wait inside [`Receiver::run`].
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Decoder state after the last handled event.
    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Wait up to `timeout` for one link event and handle it.
    ///
    /// Returns the outcome when the event ended a frame, `None` otherwise
    /// (including when no event arrived).
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<FrameOutcome>> {
        let Some(event) = self.link.next_event(timeout)? else {
            return Ok(None);
        };
        trace!(event = event.name(), state = self.decoder.state().as_str(), "link event");

        let next = self.decoder.advance(&event);
        if let Some(write) = next.write {
            self.buffers.store_received(write.offset, write.data)?;
        }
        if event.is_fault() {
            self.stats.record_fault();
            warn!(event = event.name(), "line fault; frame in progress discarded");
        }

        match next.outcome {
            Some(FrameOutcome::Complete) => self.stats.record_received(false),
            Some(FrameOutcome::Short { slots }) => {
                debug!(slots, "short frame closed by break");
                self.stats.record_received(true);
            }
            Some(FrameOutcome::AlternateStartCode(code)) => {
                trace!(start_code = code, "alternate start code frame skipped");
                self.stats.record_alternate();
            }
            None => {}
        }
        // Published before the flush so a flush failure cannot leave it stale.
        self.stats.set_receive_state(next.state);
        if next.flush_input {
            self.link.flush_input()?;
        }
        Ok(next.outcome)
    }

    /// Discard buffered link input and forget the frame in progress.
    pub fn reset(&mut self) -> Result<()> {
        self.decoder.reset();
        self.stats.set_receive_state(DecoderState::Idle);
        self.link.flush_input()?;
        Ok(())
    }

    /// Decode until `signal` requests a stop or the link closes, then hand the
    /// link back.
    ///
    /// The final decoder state stays published in [`LinkStats`] after return.
    ///
    /// Line faults never end the loop; other link errors are logged and the
    /// loop retries after one poll interval.
    pub fn run(mut self, signal: &WorkerSignal) -> L {
        self.stats.set_receive_state(self.decoder.state());
        info!(poll_ms = self.poll_interval.as_millis() as u64, "receiver started");
        while !signal.should_stop() {
            if signal.take_flush() {
                if let Err(err) = self.reset() {
                    warn!(%err, "receive flush failed");
                }
            }
            match self.poll(self.poll_interval) {
                Ok(_) => {}
                Err(FrameError::Link(TransportError::Closed)) => {
                    warn!("link closed; receiver exiting");
                    break;
                }
                Err(err) => {
                    warn!(%err, "receive poll failed");
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
        info!(
            frames = self.stats.frames_received(),
            state = self.decoder.state().as_str(),
            "receiver stopped"
        );
        self.link
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &L {
        &self.link
    }

    /// Consume the receiver and return the link.
    pub fn into_inner(self) -> L {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::thread;
    use std::time::Instant;

    use dmxlink_transport::{LinkConfig, LinkEvent, SimLink};

    use super::*;
    use crate::codec::Universe;
    use crate::slot::UNIVERSE_SIZE;

    const TICK: Duration = Duration::from_millis(10);

    fn setup() -> (SimLink, Receiver<SimLink>, Arc<FrameBuffer>, Arc<LinkStats>) {
        let mut link = SimLink::new();
        link.configure(&LinkConfig::dmx(17, 18)).unwrap();
        let buffers = Arc::new(FrameBuffer::new());
        let stats = Arc::new(LinkStats::new());
        let receiver = Receiver::new(link.clone(), Arc::clone(&buffers), Arc::clone(&stats));
        (link, receiver, buffers, stats)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn frame_event(slots: &[u8]) -> LinkEvent {
        let mut bytes = vec![0x00];
        bytes.extend_from_slice(slots);
        LinkEvent::data(bytes)
    }

    #[test]
    fn full_frame_lands_in_receive_buffer() {
        let (link, mut receiver, buffers, stats) = setup();
        let slots: Vec<u8> = (0..UNIVERSE_SIZE).map(|i| (i % 251) as u8).collect();
        link.inject_all([LinkEvent::Break, frame_event(&slots)]);

        assert_eq!(receiver.poll(TICK).unwrap(), None);
        assert_eq!(receiver.poll(TICK).unwrap(), Some(FrameOutcome::Complete));

        assert_eq!(buffers.read_snapshot().as_slice(), slots.as_slice());
        assert_eq!(stats.frames_received(), 1);
        assert_eq!(stats.receive_state(), DecoderState::FrameDone);
    }

    #[test]
    fn poll_without_events_times_out_quietly() {
        let (_link, mut receiver, buffers, _stats) = setup();
        assert_eq!(receiver.poll(Duration::from_millis(1)).unwrap(), None);
        assert_eq!(buffers.read_snapshot(), Universe::new());
    }

    #[test]
    fn break_between_frames_flushes_input() {
        let (link, mut receiver, _buffers, _stats) = setup();
        link.inject(LinkEvent::Break);
        receiver.poll(TICK).unwrap();
        assert_eq!(link.flush_count(), 1);
    }

    #[test]
    fn short_frame_counted_and_next_frame_decoded() {
        let (link, mut receiver, buffers, stats) = setup();
        link.inject_all([
            LinkEvent::Break,
            frame_event(&[1; 200]),
            LinkEvent::Break,
            frame_event(&[2; 512]),
        ]);
        for _ in 0..4 {
            receiver.poll(TICK).unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.short_frames, 1);
        assert!(buffers.read_snapshot().as_slice().iter().all(|v| *v == 2));
    }

    #[test]
    fn fault_publishes_link_error_and_counts() {
        let (link, mut receiver, _buffers, stats) = setup();
        link.inject_all([LinkEvent::Break, frame_event(&[5; 10]), LinkEvent::ParityError]);
        for _ in 0..3 {
            receiver.poll(TICK).unwrap();
        }

        assert_eq!(receiver.state(), DecoderState::LinkError);
        assert_eq!(stats.receive_state(), DecoderState::LinkError);
        assert_eq!(stats.snapshot().link_faults, 1);
        assert_eq!(link.flush_count(), 2);
    }

    /// Delegates to a `SimLink` but refuses every input flush.
    struct FlushRefusingLink(SimLink);

    impl SerialLink for FlushRefusingLink {
        fn configure(&mut self, config: &LinkConfig) -> dmxlink_transport::Result<()> {
            self.0.configure(config)
        }

        fn write(&mut self, bytes: &[u8]) -> dmxlink_transport::Result<usize> {
            self.0.write(bytes)
        }

        fn set_break(&mut self, asserted: bool) -> dmxlink_transport::Result<()> {
            self.0.set_break(asserted)
        }

        fn wait_tx_done(&mut self, timeout: Duration) -> dmxlink_transport::Result<()> {
            self.0.wait_tx_done(timeout)
        }

        fn next_event(
            &mut self,
            timeout: Duration,
        ) -> dmxlink_transport::Result<Option<LinkEvent>> {
            self.0.next_event(timeout)
        }

        fn flush_input(&mut self) -> dmxlink_transport::Result<()> {
            Err(TransportError::Io(io::Error::other("rx fifo reset failed")))
        }
    }

    #[test]
    fn failed_flush_still_publishes_state_and_counts_fault() {
        let (link, _receiver, buffers, stats) = setup();
        let mut receiver = Receiver::new(
            FlushRefusingLink(link.clone()),
            Arc::clone(&buffers),
            Arc::clone(&stats),
        );
        link.inject_all([
            LinkEvent::Break,
            LinkEvent::data(vec![0x00, 1, 2]),
            LinkEvent::ParityError,
        ]);

        // The break between frames wants a flush too.
        assert!(receiver.poll(TICK).is_err());
        assert_eq!(stats.receive_state(), DecoderState::BreakDetected);
        receiver.poll(TICK).unwrap();
        assert_eq!(stats.receive_state(), DecoderState::Receiving);

        let err = receiver.poll(TICK).unwrap_err();
        assert!(matches!(err, FrameError::Link(TransportError::Io(_))));
        assert_eq!(receiver.state(), DecoderState::LinkError);
        assert_eq!(stats.receive_state(), DecoderState::LinkError);
        assert_eq!(stats.snapshot().link_faults, 1);
        assert_eq!(buffers.read_range(1, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn alternate_start_code_counted_not_stored() {
        let (link, mut receiver, buffers, stats) = setup();
        link.inject_all([LinkEvent::Break, LinkEvent::data(vec![0xCCu8, 1, 2, 3])]);
        receiver.poll(TICK).unwrap();
        let outcome = receiver.poll(TICK).unwrap();

        assert_eq!(outcome, Some(FrameOutcome::AlternateStartCode(0xCC)));
        assert_eq!(stats.snapshot().alternate_frames, 1);
        assert_eq!(buffers.read_snapshot(), Universe::new());
    }

    #[test]
    fn reset_flushes_and_returns_to_idle() {
        let (link, mut receiver, _buffers, stats) = setup();
        link.inject_all([LinkEvent::Break, frame_event(&[1; 3])]);
        receiver.poll(TICK).unwrap();
        receiver.poll(TICK).unwrap();
        assert_eq!(receiver.state(), DecoderState::Receiving);

        receiver.reset().unwrap();
        assert_eq!(receiver.state(), DecoderState::Idle);
        assert_eq!(stats.receive_state(), DecoderState::Idle);
    }

    #[test]
    fn run_decodes_until_stopped_and_returns_link() {
        let (link, receiver, buffers, stats) = setup();
        let receiver = receiver.with_poll_interval(Duration::from_millis(5));
        let signal = Arc::new(WorkerSignal::new());
        let worker = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || receiver.run(&signal))
        };

        let mut slots = [0u8; 512];
        slots[5] = 255;
        link.inject_all([LinkEvent::Break, frame_event(&slots)]);
        wait_for(|| stats.frames_received() == 1);

        signal.request_stop();
        let returned = worker.join().unwrap();
        assert!(returned.config().is_some());
        assert_eq!(buffers.read_channel(6).unwrap(), 255);
        assert_eq!(stats.receive_state(), DecoderState::FrameDone);
    }

    #[test]
    fn run_honors_flush_requests() {
        let (link, receiver, _buffers, _stats) = setup();
        let receiver = receiver.with_poll_interval(Duration::from_millis(5));
        let signal = Arc::new(WorkerSignal::new());
        let worker = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || receiver.run(&signal))
        };

        signal.request_flush();
        wait_for(|| link.flush_count() >= 1);
        signal.request_stop();
        worker.join().unwrap();
    }

    #[test]
    fn run_exits_when_link_closes() {
        let (link, receiver, _buffers, _stats) = setup();
        let signal = WorkerSignal::new();
        link.close();
        let returned = receiver.run(&signal);
        assert!(returned.config().is_some());
    }
}
