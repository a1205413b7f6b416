use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::slot::{address_offset, range_offset, FRAME_SIZE, NULL_START_CODE, UNIVERSE_SIZE};

/// The 512 slot values of one DMX frame.
///
/// Always exactly [`UNIVERSE_SIZE`] slots; unset slots read as zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Universe {
    slots: [u8; UNIVERSE_SIZE],
}

impl Universe {
    /// An all-zero universe.
    pub const fn new() -> Self {
        Self {
            slots: [0; UNIVERSE_SIZE],
        }
    }

    /// Build a universe from up to 512 leading slot values.
    ///
    /// Slots past the end of `data` are zero.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > UNIVERSE_SIZE {
            return Err(FrameError::OutOfRange {
                start: 1,
                count: data.len(),
            });
        }
        let mut universe = Self::new();
        universe.slots[..data.len()].copy_from_slice(data);
        Ok(universe)
    }

    /// Value at a 1-based address, or `None` outside 1-512.
    pub fn get(&self, address: u16) -> Option<u8> {
        address_offset(address).ok().map(|offset| self.slots[offset])
    }

    /// Set the value at a 1-based address.
    pub fn set(&mut self, address: u16, value: u8) -> Result<()> {
        let offset = address_offset(address)?;
        self.slots[offset] = value;
        Ok(())
    }

    /// Borrow `count` slots starting at 1-based `start`.
    pub fn range(&self, start: u16, count: u16) -> Result<&[u8]> {
        let offset = range_offset(usize::from(start), usize::from(count))?;
        Ok(&self.slots[offset..offset + usize::from(count)])
    }

    /// All slots, 0-based.
    pub fn as_slice(&self) -> &[u8] {
        &self.slots
    }

    /// All slots as a fixed-size array.
    pub fn slots(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [u8; UNIVERSE_SIZE] {
        &mut self.slots
    }

    /// `(address, value)` pairs for every non-zero slot.
    pub fn active(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0)
            .map(|(offset, value)| ((offset + 1) as u16, *value))
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u8; UNIVERSE_SIZE]> for Universe {
    fn from(slots: [u8; UNIVERSE_SIZE]) -> Self {
        Self { slots }
    }
}

impl AsRef<[u8]> for Universe {
    fn as_ref(&self) -> &[u8] {
        &self.slots
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 512 mostly-zero slots are unreadable; show the active ones.
        f.debug_map().entries(self.active()).finish()
    }
}

/// A start code followed by a universe: the 513-byte wire image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub start_code: u8,
    pub universe: Universe,
}

impl Frame {
    /// Create a frame with an explicit start code.
    pub fn new(start_code: u8, universe: Universe) -> Self {
        Self {
            start_code,
            universe,
        }
    }

    /// Create a standard dimmer-data frame (start code 0x00).
    pub fn dimmer(universe: Universe) -> Self {
        Self::new(NULL_START_CODE, universe)
    }

    /// Encode the frame into the wire format.
    ///
    /// ```text
    /// ┌────────────┬───────────┬───────────┬─────┬─────────────┐
    /// │ Start code │ Slot 1    │ Slot 2    │ ... │ Slot 512    │
    /// │ (1B)       │ (1B)      │ (1B)      │     │ (1B)        │
    /// └────────────┴───────────┴───────────┴─────┴─────────────┘
    /// ```
    ///
    /// Break and mark-after-break are line conditions, not bytes, and are
    /// produced by the transmitter.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(FRAME_SIZE);
        dst.put_u8(self.start_code);
        dst.put_slice(self.universe.as_slice());
    }

    /// The wire image as an owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a wire image: a start code and up to 512 slots.
    ///
    /// Shorter images are accepted because real transmitters may send fewer
    /// slots; missing slots decode as zero.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let Some((&start_code, slots)) = src.split_first() else {
            return Err(FrameError::InvalidLength(0));
        };
        if src.len() > FRAME_SIZE {
            return Err(FrameError::InvalidLength(src.len()));
        }
        Ok(Self::new(start_code, Universe::from_slice(slots)?))
    }

    /// Total bytes on the wire after the mark-after-break.
    pub const fn wire_size(&self) -> usize {
        FRAME_SIZE
    }
}
