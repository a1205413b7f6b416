//! In-memory link and GPIO backends.
//!
//! [`SimLink`] records every outbound line action with a timestamp and serves
//! inbound events injected by a test or a capture script. [`SimPins`] records
//! direction-line levels. Both are cheap cloneable handles over shared state,
//! so one clone can be handed to a worker while another inspects the log.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{DirectionControl, LinkConfig, LinkEvent, PinId, SerialLink};

/// Default number of activity records retained by a [`SimLink`].
pub const DEFAULT_ACTIVITY_LIMIT: usize = 16 * 1024;

/// An outbound action observed on the simulated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineActivity {
    Configured(LinkConfig),
    BreakAsserted,
    BreakReleased,
    Wrote(Bytes),
    TxDone,
    InputFlushed,
}

/// A [`LineActivity`] with the instant it happened.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub at: Instant,
    pub activity: LineActivity,
}

#[derive(Debug)]
struct SimLinkState {
    config: Option<LinkConfig>,
    break_asserted: bool,
    tx_pending: bool,
    activity: VecDeque<ActivityRecord>,
    activity_limit: usize,
    inbound: VecDeque<LinkEvent>,
    flushes: usize,
    fail_configure: Option<String>,
    stall_tx: bool,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimLinkState>,
    inbound_ready: Condvar,
}

/// Simulated serial link.
#[derive(Debug, Clone)]
pub struct SimLink {
    shared: Arc<Shared>,
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLink {
    /// Create an unconfigured link with the default activity limit.
    pub fn new() -> Self {
        Self::with_activity_limit(DEFAULT_ACTIVITY_LIMIT)
    }

    /// Create a link that keeps at most `limit` activity records.
    pub fn with_activity_limit(limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimLinkState {
                    config: None,
                    break_asserted: false,
                    tx_pending: false,
                    activity: VecDeque::new(),
                    activity_limit: limit.max(1),
                    inbound: VecDeque::new(),
                    flushes: 0,
                    fail_configure: None,
                    stall_tx: false,
                    closed: false,
                }),
                inbound_ready: Condvar::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimLinkState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one inbound event.
    pub fn inject(&self, event: LinkEvent) {
        self.state().inbound.push_back(event);
        self.shared.inbound_ready.notify_all();
    }

    /// Queue a sequence of inbound events in order.
    pub fn inject_all(&self, events: impl IntoIterator<Item = LinkEvent>) {
        self.state().inbound.extend(events);
        self.shared.inbound_ready.notify_all();
    }

    /// Inbound events not yet consumed.
    pub fn pending_events(&self) -> usize {
        self.state().inbound.len()
    }

    /// Make the next `configure` calls fail with `reason`.
    pub fn fail_configure(&self, reason: impl Into<String>) {
        self.state().fail_configure = Some(reason.into());
    }

    /// Make `wait_tx_done` time out, as a wedged transmitter would.
    pub fn stall_tx(&self, stalled: bool) {
        self.state().stall_tx = stalled;
    }

    /// Close the link. Blocked and future operations report `Closed`.
    pub fn close(&self) {
        self.state().closed = true;
        self.shared.inbound_ready.notify_all();
    }

    /// Settings applied by the last successful `configure`.
    pub fn config(&self) -> Option<LinkConfig> {
        self.state().config
    }

    /// Whether the TX line is currently held in break.
    pub fn is_break_asserted(&self) -> bool {
        self.state().break_asserted
    }

    /// Number of `flush_input` calls so far.
    pub fn flush_count(&self) -> usize {
        self.state().flushes
    }

    /// Copy of the retained activity log, oldest first.
    pub fn activity(&self) -> Vec<ActivityRecord> {
        self.state().activity.iter().cloned().collect()
    }

    /// Drop the retained activity log.
    pub fn clear_activity(&self) {
        self.state().activity.clear();
    }

    /// Complete frames found in the retained activity log.
    pub fn captured_frames(&self) -> Vec<CapturedFrame> {
        frames_from_activity(&self.activity())
    }

    fn record(state: &mut SimLinkState, activity: LineActivity) {
        if state.activity.len() == state.activity_limit {
            state.activity.pop_front();
        }
        state.activity.push_back(ActivityRecord {
            at: Instant::now(),
            activity,
        });
    }

    fn ensure_open(state: &SimLinkState) -> Result<()> {
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.config.is_none() {
            return Err(TransportError::NotConfigured);
        }
        Ok(())
    }
}

impl SerialLink for SimLink {
    fn configure(&mut self, config: &LinkConfig) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if let Some(reason) = state.fail_configure.clone() {
            return Err(TransportError::Configure {
                setting: "uart",
                reason,
            });
        }
        if config.baud_rate == 0 {
            return Err(TransportError::Configure {
                setting: "baud_rate",
                reason: "must be non-zero".to_string(),
            });
        }
        state.config = Some(*config);
        state.break_asserted = false;
        Self::record(&mut state, LineActivity::Configured(*config));
        debug!(
            baud = config.baud_rate,
            tx = config.tx_pin,
            rx = config.rx_pin,
            "sim link configured"
        );
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.tx_pending = true;
        Self::record(&mut state, LineActivity::Wrote(Bytes::copy_from_slice(bytes)));
        Ok(bytes.len())
    }

    fn set_break(&mut self, asserted: bool) -> Result<()> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.break_asserted = asserted;
        let activity = if asserted {
            LineActivity::BreakAsserted
        } else {
            LineActivity::BreakReleased
        };
        Self::record(&mut state, activity);
        Ok(())
    }

    fn wait_tx_done(&mut self, timeout: Duration) -> Result<()> {
        let stalled = {
            let state = self.state();
            Self::ensure_open(&state)?;
            state.stall_tx
        };
        if stalled {
            std::thread::sleep(timeout);
            return Err(TransportError::TxTimeout(timeout));
        }
        // An idle transmitter completes immediately and leaves no record.
        let mut state = self.state();
        if std::mem::take(&mut state.tx_pending) {
            Self::record(&mut state, LineActivity::TxDone);
        }
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<LinkEvent>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }
            if let Some(event) = state.inbound.pop_front() {
                return Ok(Some(event));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .inbound_ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn flush_input(&mut self) -> Result<()> {
        // Bytes only reach the engine inside `Data` events, so there is no
        // separate receive FIFO to discard here.
        let mut state = self.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.flushes += 1;
        Self::record(&mut state, LineActivity::InputFlushed);
        Ok(())
    }
}

/// One transmitted frame reconstructed from the activity log.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Time between break assert and release.
    pub break_time: Duration,
    /// Time between break release and the first byte.
    pub mark_after_break: Duration,
    /// Idle time between the previous frame's completion and this break.
    pub gap_before: Option<Duration>,
    /// First byte after the break.
    pub start_code: u8,
    /// Every byte written after the start code, up to the next break.
    pub slots: Bytes,
    /// Whether transmit-complete was observed for this frame.
    pub completed: bool,
}

/// Reconstruct transmitted frames from an activity log.
///
/// A frame starts at `BreakAsserted`. Frames with no bytes written are skipped.
pub fn frames_from_activity(records: &[ActivityRecord]) -> Vec<CapturedFrame> {
    struct Pending {
        asserted: Instant,
        released: Option<Instant>,
        first_write: Option<Instant>,
        bytes: BytesMut,
        done: Option<Instant>,
        gap_before: Option<Duration>,
    }

    fn finish(pending: Pending, out: &mut Vec<CapturedFrame>) -> Option<Instant> {
        let (Some(released), Some(first_write)) = (pending.released, pending.first_write) else {
            return pending.done;
        };
        let mut bytes = pending.bytes;
        if bytes.is_empty() {
            return pending.done;
        }
        let start_code = bytes[0];
        let slots = bytes.split_off(1).freeze();
        out.push(CapturedFrame {
            break_time: released.saturating_duration_since(pending.asserted),
            mark_after_break: first_write.saturating_duration_since(released),
            gap_before: pending.gap_before,
            start_code,
            slots,
            completed: pending.done.is_some(),
        });
        pending.done
    }

    let mut frames = Vec::new();
    let mut current: Option<Pending> = None;
    let mut last_done: Option<Instant> = None;

    for record in records {
        match &record.activity {
            LineActivity::BreakAsserted => {
                if let Some(pending) = current.take() {
                    if let Some(done) = finish(pending, &mut frames) {
                        last_done = Some(done);
                    }
                }
                current = Some(Pending {
                    asserted: record.at,
                    released: None,
                    first_write: None,
                    bytes: BytesMut::new(),
                    done: None,
                    gap_before: last_done.map(|done| record.at.saturating_duration_since(done)),
                });
            }
            LineActivity::BreakReleased => {
                if let Some(pending) = current.as_mut() {
                    pending.released.get_or_insert(record.at);
                }
            }
            LineActivity::Wrote(bytes) => {
                if let Some(pending) = current.as_mut() {
                    if pending.released.is_some() {
                        pending.first_write.get_or_insert(record.at);
                        pending.bytes.extend_from_slice(bytes);
                    }
                }
            }
            LineActivity::TxDone => {
                if let Some(pending) = current.as_mut() {
                    if pending.first_write.is_some() {
                        pending.done = Some(record.at);
                    }
                }
            }
            LineActivity::Configured(_) | LineActivity::InputFlushed => {}
        }
    }
    if let Some(pending) = current.take() {
        finish(pending, &mut frames);
    }
    frames
}

#[derive(Debug, Default)]
struct SimPinsState {
    outputs: HashSet<PinId>,
    levels: HashMap<PinId, bool>,
    history: Vec<(PinId, bool)>,
    fail: Option<String>,
}

/// Simulated GPIO bank for the direction line.
#[derive(Debug, Clone, Default)]
pub struct SimPins {
    state: Arc<Mutex<SimPinsState>>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimPinsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent operation fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state().fail = Some(reason.into());
    }

    /// Current level of `pin`, if it has ever been driven.
    pub fn level(&self, pin: PinId) -> Option<bool> {
        self.state().levels.get(&pin).copied()
    }

    /// Whether `pin` has been configured as an output.
    pub fn is_output(&self, pin: PinId) -> bool {
        self.state().outputs.contains(&pin)
    }

    /// Every level change in order.
    pub fn history(&self) -> Vec<(PinId, bool)> {
        self.state().history.clone()
    }
}

impl DirectionControl for SimPins {
    fn set_output(&mut self, pin: PinId) -> Result<()> {
        let mut state = self.state();
        if let Some(reason) = state.fail.clone() {
            return Err(TransportError::Gpio { pin, reason });
        }
        state.outputs.insert(pin);
        Ok(())
    }

    fn set_level(&mut self, pin: PinId, high: bool) -> Result<()> {
        let mut state = self.state();
        if let Some(reason) = state.fail.clone() {
            return Err(TransportError::Gpio { pin, reason });
        }
        if !state.outputs.contains(&pin) {
            return Err(TransportError::Gpio {
                pin,
                reason: "pin is not configured as an output".to_string(),
            });
        }
        state.levels.insert(pin, high);
        state.history.push((pin, high));
        Ok(())
    }
}
