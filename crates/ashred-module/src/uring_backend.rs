//! `UringBackend` — default `WriteBackend` implementation.
//!
//! One io_uring instance per overwrite. Each write is an
//! `IORING_OP_WRITE` at an absolute offset with `user_data = SlotId`;
//! the durability barrier is an `IORING_OP_FSYNC`. No SQPOLL, no fixed
//! files, no fixed buffers. Works on any kernel with io_uring (5.6+ for
//! `IORING_OP_WRITE`).
//!
//! CQEs are reaped into a per-slot result table, so the pump's per-buffer
//! poll is a table lookup and completions can arrive in any order.

use ashred_core::backend::{WriteBackend, WriteRequest, WriteStatus};
use ashred_core::buffer::SlotId;
use ashred_core::error::{os_errno, Result, ShredError};

use io_uring::{opcode, types, IoUring};

use std::io;
use std::os::unix::io::RawFd;

/// `user_data` of the fsync SQE. Slot ids are u32, so this never collides.
const SYNC_TOKEN: u64 = u64::MAX;

/// Configuration for UringBackend.
#[derive(Debug, Clone, Copy)]
pub struct UringBackendConfig {
    /// Number of SQ entries. Rounded up to a power of two by the kernel.
    pub sq_entries: u32,
}

impl Default for UringBackendConfig {
    fn default() -> Self {
        Self { sq_entries: 16 }
    }
}

impl UringBackendConfig {
    /// Room for every buffer in the pool plus the fsync.
    pub fn for_pool(buffer_count: usize) -> Self {
        Self {
            sq_entries: (buffer_count + 1).next_power_of_two() as u32,
        }
    }
}

pub struct UringBackend {
    ring: IoUring,
    /// Target descriptor. Borrowed: the caller keeps the `File` open.
    fd: RawFd,
    /// Reaped-but-unpolled results, indexed by slot.
    results: Vec<Option<i64>>,
    sync_result: Option<i64>,
    inflight: usize,
    pending_submit: usize,
    /// Offset of the oldest write not yet handed to the kernel (for error reports).
    pending_offset: u64,
}

impl UringBackend {
    /// Create a ring for writes to `fd` from a pool of `slots` buffers.
    pub fn new(fd: RawFd, slots: usize, config: UringBackendConfig) -> Result<Self> {
        let ring = IoUring::builder()
            .build(config.sq_entries)
            .map_err(|e| ShredError::Setup(os_errno(&e)))?;

        Ok(Self {
            ring,
            fd,
            results: vec![None; slots],
            sync_result: None,
            inflight: 0,
            pending_submit: 0,
            pending_offset: 0,
        })
    }

    /// Drain the CQ into the result table.
    fn reap(&mut self) {
        for cqe in self.ring.completion() {
            let result = cqe.result() as i64;
            match cqe.user_data() {
                SYNC_TOKEN => self.sync_result = Some(result),
                user_data => {
                    let slot = SlotId::from_user_data(user_data).index();
                    if let Some(entry) = self.results.get_mut(slot) {
                        *entry = Some(result);
                    }
                }
            }
        }
    }

    fn has_ready(&self) -> bool {
        self.results.iter().any(Option::is_some)
    }

    /// `io_uring_enter(to_submit, min_complete = 1)`, retried on EINTR.
    fn enter_and_wait(&mut self) -> io::Result<()> {
        loop {
            match self.ring.submit_and_wait(1) {
                Ok(submitted) => {
                    self.pending_submit = self.pending_submit.saturating_sub(submitted);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl WriteBackend for UringBackend {
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()> {
        debug_assert!(self.results[req.slot.index()].is_none());

        let sqe = opcode::Write::new(types::Fd(self.fd), req.ptr, req.len as u32)
            .offset(req.offset)
            .build()
            .user_data(req.slot.as_user_data());

        if self.ring.submission().is_full() {
            self.flush()?;
        }
        // Safety: the caller guarantees `req.ptr` stays valid and untouched
        // until this slot's completion is observed.
        self.ring
            .submission()
            .push(&sqe)
            .map_err(|_| ShredError::Write { offset: req.offset, errno: libc::EAGAIN })?;

        if self.pending_submit == 0 {
            self.pending_offset = req.offset;
        }
        self.pending_submit += 1;
        self.inflight += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        if self.pending_submit == 0 {
            return Ok(0);
        }
        loop {
            match self.ring.submit() {
                Ok(submitted) => {
                    self.pending_submit = self.pending_submit.saturating_sub(submitted);
                    return Ok(submitted);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ShredError::Write {
                        offset: self.pending_offset,
                        errno: os_errno(&e),
                    })
                }
            }
        }
    }

    fn poll(&mut self, slot: SlotId) -> WriteStatus {
        self.reap();
        match self.results.get_mut(slot.index()).and_then(Option::take) {
            Some(result) => {
                self.inflight = self.inflight.saturating_sub(1);
                WriteStatus::Complete(result)
            }
            None => WriteStatus::InFlight,
        }
    }

    fn wait_any(&mut self) -> Result<()> {
        loop {
            self.reap();
            if self.has_ready() {
                return Ok(());
            }
            if self.inflight == 0 {
                // Nothing outstanding can ever complete.
                return Err(ShredError::Wait(libc::EINVAL));
            }
            self.enter_and_wait()
                .map_err(|e| ShredError::Wait(os_errno(&e)))?;
        }
    }

    fn sync(&mut self) -> Result<()> {
        self.flush().map_err(|e| ShredError::Sync(e.errno()))?;

        let sqe = opcode::Fsync::new(types::Fd(self.fd))
            .build()
            .user_data(SYNC_TOKEN);
        // Safety: fsync references no user memory.
        unsafe { self.ring.submission().push(&sqe) }
            .map_err(|_| ShredError::Sync(libc::EBUSY))?;
        self.pending_submit += 1;
        self.sync_result = None;

        loop {
            self.enter_and_wait()
                .map_err(|e| ShredError::Sync(os_errno(&e)))?;
            self.reap();
            if let Some(result) = self.sync_result.take() {
                if result < 0 {
                    return Err(ShredError::Sync((-result) as i32));
                }
                return Ok(());
            }
        }
    }

    fn inflight(&self) -> usize {
        self.inflight
    }

    fn shutdown(&mut self) {
        while self.inflight > 0 {
            self.reap();
            let ready = self.results.iter_mut().filter_map(Option::take).count();
            self.inflight = self.inflight.saturating_sub(ready);
            if self.inflight == 0 {
                break;
            }
            if let Err(e) = self.enter_and_wait() {
                tracing::warn!(error = %e, inflight = self.inflight, "io_uring drain aborted");
                break;
            }
        }
        self.pending_submit = 0;
    }
}

// The inner `io_uring::IoUring` closes the ring fd and unmaps the rings on
// drop. Outstanding writes reference pool memory, so drain them first.
impl Drop for UringBackend {
    fn drop(&mut self) {
        if self.inflight > 0 {
            self.shutdown();
        }
    }
}
