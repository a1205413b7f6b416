//! DMX512 framing: universes, frame timing and receive decoding.
//!
//! A frame on the wire is a break, a mark-after-break, one start code byte
//! and 512 slot bytes. This crate owns everything between the serial link and
//! the application:
//! - [`FrameBuffer`] holds the send and receive universes behind short locks
//! - [`Transmitter`] repeats the break/mark/start-code/payload cycle
//! - [`ReceiverDecoder`] rebuilds a universe from inbound link events
//!
//! Frame boundaries on the receive side are inferred from the break condition
//! and the slot count alone. DMX carries no end-of-frame marker.

pub mod buffer;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod signal;
pub mod slot;
pub mod stats;
pub mod timing;
pub mod writer;

pub use buffer::FrameBuffer;
pub use codec::{Frame, Universe};
pub use decoder::{
    transition, DecoderState, FrameOutcome, ReceiverDecoder, SlotWrite, Transition,
};
pub use error::{FrameError, Result};
pub use reader::{Receiver, DEFAULT_POLL_INTERVAL};
pub use signal::WorkerSignal;
pub use slot::{
    start_code_name, FRAME_SIZE, MAX_ADDRESS, MIN_ADDRESS, NULL_START_CODE, RDM_START_CODE,
    SYSTEM_INFO_START_CODE, TEST_START_CODE, TEXT_START_CODE, UNIVERSE_SIZE,
};
pub use stats::{LinkStats, StatsSnapshot};
pub use timing::{
    TimingConfig, DEFAULT_BREAK, DEFAULT_INTER_FRAME_GAP, DEFAULT_MARK_AFTER_BREAK,
    DEFAULT_TX_DONE_TIMEOUT, MIN_BREAK, MIN_MARK_AFTER_BREAK, SLOT_TIME,
};
pub use writer::Transmitter;
