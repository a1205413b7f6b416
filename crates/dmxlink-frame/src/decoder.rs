//! Receive-side decoding state machine.
//!
//! DMX has no end-of-frame marker. A frame begins at a break, its first byte
//! is the start code, and it ends either after slot 512 or at the next break.
//! A short or long physical frame therefore self-corrects at the next break.
//!
//! [`transition`] is a pure function from (state, cursor, event) to the next
//! state plus the buffer mutation to apply, so the framing rules can be
//! tested without a link or a thread.

use dmxlink_transport::LinkEvent;
use serde::Serialize;

use crate::codec::Universe;
use crate::slot::{NULL_START_CODE, UNIVERSE_SIZE};

/// Where the decoder is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum DecoderState {
    /// No break seen yet.
    Idle = 0,
    /// Break seen; the next byte is the start code.
    BreakDetected = 1,
    /// Storing slots at the cursor.
    Receiving = 2,
    /// Slot 512 stored, or an alternate start code skipped.
    FrameDone = 3,
    /// A line fault discarded the frame in progress.
    LinkError = 4,
}

impl DecoderState {
    /// Convert from the raw value published in [`crate::LinkStats`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::BreakDetected,
            2 => Self::Receiving,
            3 => Self::FrameDone,
            4 => Self::LinkError,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BreakDetected => "break-detected",
            Self::Receiving => "receiving",
            Self::FrameDone => "frame-done",
            Self::LinkError => "link-error",
        }
    }
}

/// How a frame ended, reported on the transition that ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// All 512 slots were stored.
    Complete,
    /// A break arrived after `slots` slots. Later slots keep prior values.
    ///
    /// The decoder is already in [`DecoderState::BreakDetected`] for the next
    /// frame, so a short frame shows up here and never as a state.
    Short { slots: usize },
    /// The frame carried a non-zero start code and was skipped.
    AlternateStartCode(u8),
}

/// Bytes to copy into the receive universe at a 0-based offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWrite<'a> {
    pub offset: usize,
    pub data: &'a [u8],
}

/// Result of feeding one event to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<'a> {
    /// State after the event.
    pub state: DecoderState,
    /// 0-based offset of the next slot to store.
    pub cursor: usize,
    /// Buffer mutation, if the event carried slot data.
    pub write: Option<SlotWrite<'a>>,
    /// Whether buffered link input must be discarded.
    pub flush_input: bool,
    /// Set when this event ended a frame.
    pub outcome: Option<FrameOutcome>,
}

impl<'a> Transition<'a> {
    fn to(state: DecoderState, cursor: usize) -> Self {
        Self {
            state,
            cursor,
            write: None,
            flush_input: false,
            outcome: None,
        }
    }

    /// Apply the buffer mutation to `universe`.
    pub fn apply_to(&self, universe: &mut Universe) {
        if let Some(write) = self.write {
            universe.slots_mut()[write.offset..write.offset + write.data.len()]
                .copy_from_slice(write.data);
        }
    }
}

/// Compute the next decoder step.
///
/// - `Break` from any state re-arms the decoder. Input is flushed when the
///   previous frame was already finished (`Idle`, `FrameDone`, `LinkError`);
///   a break while `Receiving` closes a short frame instead.
/// - `Data` after a break inspects the start code. `0x00` starts slot storage
///   with the rest of the run; anything else skips the frame.
/// - Line faults flush input and move to `LinkError`, except from `Idle`,
///   which has no frame to discard.
pub fn transition(state: DecoderState, cursor: usize, event: &LinkEvent) -> Transition<'_> {
    match event {
        LinkEvent::Break => {
            let mut next = Transition::to(DecoderState::BreakDetected, 0);
            next.flush_input = matches!(
                state,
                DecoderState::Idle | DecoderState::FrameDone | DecoderState::LinkError
            );
            if state == DecoderState::Receiving {
                next.outcome = Some(FrameOutcome::Short { slots: cursor });
            }
            next
        }
        LinkEvent::Data(bytes) => match state {
            DecoderState::BreakDetected => match bytes.split_first() {
                None => Transition::to(state, cursor),
                Some((&NULL_START_CODE, slots)) => receive(0, slots),
                Some((&code, _)) => {
                    let mut next = Transition::to(DecoderState::FrameDone, 0);
                    next.outcome = Some(FrameOutcome::AlternateStartCode(code));
                    next
                }
            },
            DecoderState::Receiving => receive(cursor, bytes),
            // Bytes outside a frame belong to nobody; wait for the next break.
            DecoderState::Idle | DecoderState::FrameDone | DecoderState::LinkError => {
                Transition::to(state, cursor)
            }
        },
        LinkEvent::FrameError
        | LinkEvent::ParityError
        | LinkEvent::Overflow
        | LinkEvent::BufferFull => {
            let target = if state == DecoderState::Idle {
                DecoderState::Idle
            } else {
                DecoderState::LinkError
            };
            let mut next = Transition::to(target, 0);
            next.flush_input = true;
            next
        }
    }
}

fn receive(cursor: usize, data: &[u8]) -> Transition<'_> {
    let cursor = cursor.min(UNIVERSE_SIZE);
    let take = data.len().min(UNIVERSE_SIZE - cursor);
    let end = cursor + take;

    let mut next = if end == UNIVERSE_SIZE {
        let mut done = Transition::to(DecoderState::FrameDone, end);
        done.outcome = Some(FrameOutcome::Complete);
        done
    } else {
        Transition::to(DecoderState::Receiving, end)
    };
    if take > 0 {
        next.write = Some(SlotWrite {
            offset: cursor,
            data: &data[..take],
        });
    }
    next
}

/// Stateful wrapper over [`transition`].
#[derive(Debug, Clone)]
pub struct ReceiverDecoder {
    state: DecoderState,
    cursor: usize,
}

impl Default for ReceiverDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            cursor: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 0-based offset of the next slot to store.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Advance on `event` and return what the caller must do.
    pub fn advance<'a>(&mut self, event: &'a LinkEvent) -> Transition<'a> {
        let next = transition(self.state, self.cursor, event);
        self.state = next.state;
        self.cursor = next.cursor;
        next
    }

    /// Advance on `event` and apply any slot data to `universe` directly.
    pub fn feed(&mut self, event: &LinkEvent, universe: &mut Universe) -> Option<FrameOutcome> {
        let next = self.advance(event);
        next.apply_to(universe);
        next.outcome
    }

    /// Forget the frame in progress.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.cursor = 0;
    }
}
