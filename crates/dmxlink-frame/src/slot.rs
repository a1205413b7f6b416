//! Slot addressing and start codes.
//!
//! Public addresses are 1-based (1-512). Buffers are 0-based internally, so
//! address `a` lives at offset `a - 1`.

use crate::error::{FrameError, Result};

/// Number of data slots in a universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Start code plus every slot.
pub const FRAME_SIZE: usize = UNIVERSE_SIZE + 1;

/// Lowest valid slot address.
pub const MIN_ADDRESS: u16 = 1;

/// Highest valid slot address.
pub const MAX_ADDRESS: u16 = UNIVERSE_SIZE as u16;

/// Standard dimmer data.
pub const NULL_START_CODE: u8 = 0x00;

/// ASCII text packet.
pub const TEXT_START_CODE: u8 = 0x17;

/// Test packet.
pub const TEST_START_CODE: u8 = 0x55;

/// Remote Device Management. Recognised for reporting only.
pub const RDM_START_CODE: u8 = 0xCC;

/// System information packet.
pub const SYSTEM_INFO_START_CODE: u8 = 0xCF;

/// Returns a human-readable name for a start code.
pub fn start_code_name(code: u8) -> &'static str {
    match code {
        NULL_START_CODE => "NULL",
        TEXT_START_CODE => "TEXT",
        TEST_START_CODE => "TEST",
        RDM_START_CODE => "RDM",
        SYSTEM_INFO_START_CODE => "SYSTEM_INFO",
        0x90 => "UTF8_TEXT",
        0x91 => "MANUFACTURER",
        0x92..=0xA9 | 0xAB..=0xCD | 0xF0..=0xF7 => "RESERVED",
        _ => "ALTERNATE",
    }
}

/// Offset of a single 1-based address.
pub(crate) fn address_offset(address: u16) -> Result<usize> {
    range_offset(usize::from(address), 1)
}

/// Offset of the first slot in a 1-based `start..start+count` range.
pub(crate) fn range_offset(start: usize, count: usize) -> Result<usize> {
    let out_of_range = FrameError::OutOfRange { start, count };
    if start < usize::from(MIN_ADDRESS) || count < 1 {
        return Err(out_of_range);
    }
    match start.checked_add(count - 1) {
        Some(last) if last <= UNIVERSE_SIZE => Ok(start - 1),
        _ => Err(out_of_range),
    }
}

/// Validate a 0-based `offset..offset+len` span.
pub(crate) fn span_end(offset: usize, len: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= UNIVERSE_SIZE => Ok(end),
        _ => Err(FrameError::OutOfRange {
            start: offset.saturating_add(1),
            count: len,
        }),
    }
}
