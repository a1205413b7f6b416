use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

use crate::decoder::DecoderState;

/// Counters shared between the active worker and the controller.
#[derive(Debug)]
pub struct LinkStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    short_frames: AtomicU64,
    alternate_frames: AtomicU64,
    link_faults: AtomicU64,
    tx_timeouts: AtomicU64,
    receive_state: AtomicU8,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub short_frames: u64,
    pub alternate_frames: u64,
    pub link_faults: u64,
    pub tx_timeouts: u64,
    pub receive_state: DecoderState,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            short_frames: AtomicU64::new(0),
            alternate_frames: AtomicU64::new(0),
            link_faults: AtomicU64::new(0),
            tx_timeouts: AtomicU64::new(0),
            receive_state: AtomicU8::new(DecoderState::Idle as u8),
        }
    }

    #[inline]
    pub(crate) fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_received(&self, short: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if short {
            self.short_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_alternate(&self) {
        self.alternate_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fault(&self) {
        self.link_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_tx_timeout(&self) {
        self.tx_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_receive_state(&self, state: DecoderState) {
        self.receive_state.store(state as u8, Ordering::Release);
    }

    /// Decoder state last published by the receiver.
    #[inline]
    pub fn receive_state(&self) -> DecoderState {
        DecoderState::from_u8(self.receive_state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent(),
            frames_received: self.frames_received(),
            short_frames: self.short_frames.load(Ordering::Relaxed),
            alternate_frames: self.alternate_frames.load(Ordering::Relaxed),
            link_faults: self.link_faults.load(Ordering::Relaxed),
            tx_timeouts: self.tx_timeouts.load(Ordering::Relaxed),
            receive_state: self.receive_state(),
        }
    }
}
