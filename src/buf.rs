//! Shared pool of wire-format HCI packet buffers.
//!
//! Every packet handed to the host transport lives in a [`WireBuffer`]
//! claimed from a static [`BufPool`]. A claim is released exactly once, when
//! the buffer is dropped, regardless of whether the packet was transmitted or
//! abandoned on an error path. Exhaustion is observable: [`BufPool::alloc`]
//! returns `None`, and the caller decides (per event class) whether to drop
//! or retry.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicU32, Ordering};

/// Largest HCI packet the bridge produces: a 2-byte event header plus the
/// maximum 255 parameter bytes.
pub const BUF_CAP: usize = 2 + 255;

/// Buffers per pool.
pub const POOL_SIZE: usize = 8;

const POOL_MASK: u32 = (1 << POOL_SIZE) - 1;

/// Fixed set of [`BUF_CAP`]-sized slots with an atomic claim bitmap.
///
/// Safe to share between the radio and host-command contexts; a slot's bytes
/// are only touched through the [`WireBuffer`] holding its claim bit.
pub struct BufPool {
    slots: [UnsafeCell<[u8; BUF_CAP]>; POOL_SIZE],
    claimed: AtomicU32,
}

// Slot access is gated by the claim bitmap.
unsafe impl Sync for BufPool {}

impl BufPool {
    pub const fn new() -> Self {
        Self {
            slots: [const { UnsafeCell::new([0; BUF_CAP]) }; POOL_SIZE],
            claimed: AtomicU32::new(0),
        }
    }

    /// Claim a free slot. Returns `None` when the pool is exhausted.
    pub fn alloc(&'static self) -> Option<WireBuffer> {
        loop {
            let cur = self.claimed.load(Ordering::Acquire);
            let free = !cur & POOL_MASK;
            if free == 0 {
                return None;
            }
            let idx = free.trailing_zeros();
            if self
                .claimed
                .compare_exchange_weak(cur, cur | (1 << idx), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(WireBuffer {
                    pool: self,
                    idx: idx as u8,
                    len: 0,
                });
            }
        }
    }

    /// Number of currently claimed slots.
    pub fn in_use(&self) -> usize {
        (self.claimed.load(Ordering::Relaxed) & POOL_MASK).count_ones() as usize
    }
}

impl Default for BufPool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Write would exceed [`BUF_CAP`].
    Overflow,
}

/// One wire-format HCI packet under construction or awaiting transport.
///
/// Holds a claim on a pool slot; dropping the buffer returns the slot.
pub struct WireBuffer {
    pool: &'static BufPool,
    idx: u8,
    len: usize,
}

impl WireBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        BUF_CAP
    }

    pub fn remaining(&self) -> usize {
        BUF_CAP - self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        // The claim bit makes this slot exclusively ours.
        unsafe { &(&*self.pool.slots[self.idx as usize].get())[..self.len] }
    }

    fn slot_mut(&mut self) -> &mut [u8; BUF_CAP] {
        unsafe { &mut *self.pool.slots[self.idx as usize].get() }
    }

    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        if self.len >= BUF_CAP {
            return Err(Error::Overflow);
        }
        let at = self.len;
        self.slot_mut()[at] = byte;
        self.len = at + 1;
        Ok(())
    }

    pub fn push_u16_le(&mut self, v: u16) -> Result<(), Error> {
        self.extend_from_slice(&v.to_le_bytes())
    }

    /// All-or-nothing append.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > self.remaining() {
            return Err(Error::Overflow);
        }
        let at = self.len;
        self.slot_mut()[at..at + bytes.len()].copy_from_slice(bytes);
        self.len = at + bytes.len();
        Ok(())
    }
}

impl Drop for WireBuffer {
    fn drop(&mut self) {
        self.pool
            .claimed
            .fetch_and(!(1u32 << self.idx), Ordering::AcqRel);
    }
}

impl core::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "WireBuffer({:02x?})", self.as_slice())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WireBuffer {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "WireBuffer({:02x})", self.as_slice())
    }
}
