use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::codec::Universe;
use crate::error::{FrameError, Result};
use crate::slot::{address_offset, range_offset, span_end};

/// The send universe and the receive universe, each behind its own lock.
///
/// Every lock is held only for a single copy of at most 512 bytes. Callers
/// always get copies, never references into the shared storage, so a reader
/// can never observe a half-applied write.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    send: Mutex<Universe>,
    receive: Mutex<Universe>,
}

// Slot bytes are valid in every state, so a panic elsewhere while a guard was
// held leaves nothing to repair.
fn lock(universe: &Mutex<Universe>) -> MutexGuard<'_, Universe> {
    universe.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameBuffer {
    /// Both universes start all-zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `data` into the send universe starting at 0-based `offset`.
    ///
    /// Fails without touching the buffer if the span runs past slot 512.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = span_end(offset, data.len()).inspect_err(|err| {
            warn!(offset, len = data.len(), %err, "send buffer write rejected");
        })?;
        lock(&self.send).slots_mut()[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Replace the leading slots of the send universe with `data`.
    pub fn write_universe(&self, data: &[u8]) -> Result<()> {
        self.write(0, data)
    }

    /// Set one send slot by 1-based address.
    pub fn write_channel(&self, address: u16, value: u8) -> Result<()> {
        let offset = address_offset(address).inspect_err(|_| {
            warn!(address, "address out of scope (1-512); write ignored");
        })?;
        lock(&self.send).slots_mut()[offset] = value;
        Ok(())
    }

    /// Consistent copy of the send universe, as the transmitter takes it once
    /// per cycle.
    pub fn send_snapshot(&self) -> Universe {
        *lock(&self.send)
    }

    /// Consistent copy of the receive universe.
    pub fn read_snapshot(&self) -> Universe {
        *lock(&self.receive)
    }

    /// One received slot by 1-based address.
    pub fn read_channel(&self, address: u16) -> Result<u8> {
        let offset = address_offset(address).inspect_err(|_| {
            warn!(address, "address out of scope (1-512); read rejected");
        })?;
        Ok(lock(&self.receive).slots()[offset])
    }

    /// Copy `count` received slots starting at 1-based `start`.
    pub fn read_range(&self, start: u16, count: u16) -> Result<Vec<u8>> {
        let offset = range_offset(usize::from(start), usize::from(count)).inspect_err(|err| {
            warn!(start, count, %err, "range read rejected");
        })?;
        let count = usize::from(count);

        // Allocate before locking so the critical section stays a plain copy.
        let mut out = Vec::new();
        out.try_reserve_exact(count)
            .map_err(|_| FrameError::Allocation { requested: count })?;
        out.extend_from_slice(&lock(&self.receive).slots()[offset..offset + count]);
        Ok(out)
    }

    /// Store decoded bytes into the receive universe at 0-based `offset`.
    pub(crate) fn store_received(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = span_end(offset, data.len())?;
        lock(&self.receive).slots_mut()[offset..end].copy_from_slice(data);
        Ok(())
    }
}
