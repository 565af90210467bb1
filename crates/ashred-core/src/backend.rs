//! Asynchronous write backend abstraction.
//!
//! A `WriteBackend` owns the target descriptor's asynchronous write path:
//! submit positioned writes, report per-slot completion, block until any
//! outstanding write finishes, and run the durability barrier.
//!
//! # Implementors (ashred-module)
//!
//! - `UringBackend` (default): `IORING_OP_WRITE` with absolute offsets,
//!   `IORING_OP_FSYNC` for the barrier. Completions are reaped from the CQ
//!   into a per-slot table.
//!
//! - `WorkerBackend` (fallback): blocking `pwrite` on a fixed pool of
//!   writer threads, completion wakeups through an eventfd. For kernels or
//!   sandboxes without io_uring.
//!
//! - `MemoryBackend` (testing): writes land in an in-memory image,
//!   completion order and failures are scripted.

use crate::buffer::SlotId;
use crate::error::Result;

/// One positioned write of `len` bytes from `ptr` to `offset`.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest {
    /// Correlation token; at most one outstanding request per slot.
    pub slot: SlotId,
    pub ptr: *const u8,
    pub len: usize,
    pub offset: u64,
}

// Safety: a request is a pointer + metadata. Validity of the pointed-to
// memory is the submitter's contract (see `WriteBackend::submit`).
unsafe impl Send for WriteRequest {}

/// Completion status of a slot's outstanding write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Still in flight (or no write outstanding for this slot).
    InFlight,
    /// Finished. Bytes written, or negative errno.
    Complete(i64),
}

/// Positioned asynchronous writes against one target.
///
/// **Contract:**
/// - `submit()`, `flush()` and `poll()` never block on the write itself.
/// - `wait_any()` is the only blocking call on the write path; it returns
///   once at least one outstanding write has a completion ready for `poll()`.
/// - A completion is reported by `poll()` exactly once.
/// - `sync()` is only called with no writes outstanding.
pub trait WriteBackend {
    /// Queue a write. It may not reach the kernel until `flush()`.
    ///
    /// # Safety
    ///
    /// `req.ptr` must be valid for reads of `req.len` bytes and must not be
    /// written to until `poll(req.slot)` has returned `Complete`, or
    /// `shutdown()` has returned.
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()>;

    /// Hand all queued writes to the kernel. Returns how many were handed over.
    fn flush(&mut self) -> Result<usize>;

    /// Non-blocking completion check for one slot.
    fn poll(&mut self, slot: SlotId) -> WriteStatus;

    /// Block until at least one outstanding write has completed.
    fn wait_any(&mut self) -> Result<()>;

    /// Durability barrier: force written data to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Writes submitted but not yet reported by `poll()`.
    fn inflight(&self) -> usize;

    /// Wait out every outstanding write and discard the results.
    ///
    /// Used on abort paths so buffers can be released. Never syncs.
    fn shutdown(&mut self);
}

impl<B: WriteBackend + ?Sized> WriteBackend for &mut B {
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()> {
        (**self).submit(req)
    }

    fn flush(&mut self) -> Result<usize> {
        (**self).flush()
    }

    fn poll(&mut self, slot: SlotId) -> WriteStatus {
        (**self).poll(slot)
    }

    fn wait_any(&mut self) -> Result<()> {
        (**self).wait_any()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn inflight(&self) -> usize {
        (**self).inflight()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
