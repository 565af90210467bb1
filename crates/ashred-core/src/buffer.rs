//! Buffer pool types.
//!
//! A `BufferPool` owns `N` equally sized heap buffers. Each buffer carries
//! an explicit [`BufferState`]:
//!
//! ```text
//!   Filling ──dispatch──▶ Draining{offset,len} ──harvest+refill──▶ Filling
//! ```
//!
//! - `Filling`: holds randomness not yet written. Only a `Filling` buffer
//!   hands out `&mut [u8]` (see [`Buffer::filling_mut`]).
//! - `Draining`: a write of its first `len` bytes to `offset` is
//!   outstanding. The backing allocation must not be touched until the
//!   write is harvested; the state tag is what enforces that.
//!
//! The backing storage is a `Box<[u8]>` that is never reallocated, so the
//! pointer handed to the backend stays valid for the life of the pool.

use crate::config::PumpConfig;

/// Index of a buffer in the pool.
///
/// Doubles as the correlation token handed to the write backend
/// (io_uring `user_data`, worker completion id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn as_user_data(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    pub fn from_user_data(user_data: u64) -> Self {
        Self(user_data as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Staged randomness, associated with the random source.
    Filling,
    /// Outstanding write of `len` bytes at `offset`, associated with the target.
    Draining { offset: u64, len: usize },
}

pub struct Buffer {
    data: Box<[u8]>,
    state: BufferState,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            state: BufferState::Filling,
        }
    }

    #[inline]
    pub fn state(&self) -> BufferState {
        self.state
    }

    #[inline]
    pub fn is_draining(&self) -> bool {
        matches!(self.state, BufferState::Draining { .. })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Writable view for refilling. `None` while a write is outstanding.
    pub fn filling_mut(&mut self) -> Option<&mut [u8]> {
        match self.state {
            BufferState::Filling => Some(&mut self.data),
            BufferState::Draining { .. } => None,
        }
    }

    /// Contents, readable only while `Filling`.
    pub fn filling(&self) -> Option<&[u8]> {
        match self.state {
            BufferState::Filling => Some(&self.data),
            BufferState::Draining { .. } => None,
        }
    }

    /// Base pointer of the allocation, for building write requests.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// `Filling → Draining`. Called once the write has been accepted by the backend.
    pub fn mark_draining(&mut self, offset: u64, len: usize) {
        debug_assert_eq!(self.state, BufferState::Filling);
        debug_assert!(len <= self.data.len());
        self.state = BufferState::Draining { offset, len };
    }

    /// `Draining → Filling`. Returns the `(offset, len)` of the finished write.
    ///
    /// Returns `None` (and changes nothing) if the buffer was not draining.
    pub fn mark_filling(&mut self) -> Option<(u64, usize)> {
        match self.state {
            BufferState::Draining { offset, len } => {
                self.state = BufferState::Filling;
                Some((offset, len))
            }
            BufferState::Filling => None,
        }
    }
}

/// Fixed collection of `N` buffers of `B` bytes each.
///
/// Allocated once per overwrite, dropped when the overwrite ends.
pub struct BufferPool {
    buffers: Vec<Buffer>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new(config: &PumpConfig) -> Self {
        let buffers = (0..config.buffer_count)
            .map(|_| Buffer::new(config.buffer_size))
            .collect();
        Self {
            buffers,
            buffer_size: config.buffer_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Slot ids in pool order.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> {
        (0..self.buffers.len() as u32).map(SlotId)
    }

    #[inline]
    pub fn get(&self, slot: SlotId) -> &Buffer {
        &self.buffers[slot.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: SlotId) -> &mut Buffer {
        &mut self.buffers[slot.index()]
    }

    /// Number of buffers with an outstanding write.
    pub fn draining(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_draining()).count()
    }
}
