//! `WorkerBackend` — thread-pool `WriteBackend` implementation.
//!
//! Spawns a fixed set of writer threads at creation. The pump pushes
//! write requests onto a lock-free MPMC queue; writers dequeue, run a
//! blocking `pwrite(2)` (looping over partial writes), push the result to
//! a result queue and bump an eventfd. The pump reaps the result queue
//! into a per-slot table and blocks on the eventfd in `wait_any()`.
//!
//! No dynamic scaling. Used when io_uring is unavailable.

use ashred_core::backend::{WriteBackend, WriteRequest, WriteStatus};
use ashred_core::buffer::SlotId;
use ashred_core::error::{os_errno, Result, ShredError};

use crate::eventfd::EventFd;

use crossbeam_queue::ArrayQueue;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Upper bound on writer threads.
pub const MAX_WRITER_THREADS: usize = 32;

#[derive(Debug, Clone, Copy)]
struct WriteCompletion {
    slot: SlotId,
    result: i64,
}

/// Shared state between the pump and the writers.
struct PoolInner {
    /// Work queue: pump → writers.
    work_queue: ArrayQueue<WriteRequest>,
    /// Result queue: writers → pump.
    result_queue: ArrayQueue<WriteCompletion>,
    /// Signalled once per pushed result.
    events: EventFd,
    shutdown: AtomicBool,
    /// Target descriptor. Borrowed: the caller keeps the `File` open.
    fd: RawFd,
}

pub struct WorkerBackend {
    inner: Arc<PoolInner>,
    handles: Vec<thread::JoinHandle<()>>,
    results: Vec<Option<i64>>,
    inflight: usize,
    /// Requests pushed since the last `flush()`.
    queued: usize,
}

impl WorkerBackend {
    /// Create a backend writing to `fd` from a pool of `slots` buffers,
    /// with up to `threads` writers (never more than `slots`).
    pub fn new(fd: RawFd, slots: usize, threads: usize) -> Result<Self> {
        let depth = slots.max(1);
        let threads = threads.clamp(1, MAX_WRITER_THREADS).min(depth);
        let inner = Arc::new(PoolInner {
            work_queue: ArrayQueue::new(depth),
            result_queue: ArrayQueue::new(depth),
            events: EventFd::create()?,
            shutdown: AtomicBool::new(false),
            fd,
        });

        let mut backend = Self {
            inner,
            handles: Vec::with_capacity(threads),
            results: vec![None; slots],
            inflight: 0,
            queued: 0,
        };

        for worker_id in 0..threads {
            let inner = Arc::clone(&backend.inner);
            let spawned = thread::Builder::new()
                .name(format!("ashred-writer-{}", worker_id))
                .spawn(move || worker_loop(inner));
            match spawned {
                Ok(handle) => backend.handles.push(handle),
                // Drop joins the writers already started.
                Err(e) => return Err(ShredError::Setup(os_errno(&e))),
            }
        }

        tracing::debug!(threads, depth, "writer pool started");
        Ok(backend)
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    fn wake_writers(&self) {
        for handle in &self.handles {
            handle.thread().unpark();
        }
    }

    /// Move finished writes from the result queue into the slot table.
    fn collect(&mut self) {
        while let Some(c) = self.inner.result_queue.pop() {
            if let Some(entry) = self.results.get_mut(c.slot.index()) {
                *entry = Some(c.result);
            }
        }
    }

    fn has_ready(&self) -> bool {
        self.results.iter().any(Option::is_some)
    }
}

impl WriteBackend for WorkerBackend {
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()> {
        debug_assert!(self.results[req.slot.index()].is_none());
        self.inner
            .work_queue
            .push(req)
            .map_err(|_| ShredError::Write { offset: req.offset, errno: libc::EAGAIN })?;
        self.inflight += 1;
        self.queued += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        let n = std::mem::take(&mut self.queued);
        if n > 0 {
            self.wake_writers();
        }
        Ok(n)
    }

    fn poll(&mut self, slot: SlotId) -> WriteStatus {
        self.collect();
        match self.results.get_mut(slot.index()).and_then(Option::take) {
            Some(result) => {
                self.inflight = self.inflight.saturating_sub(1);
                WriteStatus::Complete(result)
            }
            None => WriteStatus::InFlight,
        }
    }

    fn wait_any(&mut self) -> Result<()> {
        if self.queued > 0 {
            self.flush()?;
        }
        loop {
            self.collect();
            if self.has_ready() {
                return Ok(());
            }
            if self.inflight == 0 {
                return Err(ShredError::Wait(libc::EINVAL));
            }
            self.inner
                .events
                .wait()
                .map_err(|e| ShredError::Wait(os_errno(&e)))?;
        }
    }

    fn sync(&mut self) -> Result<()> {
        loop {
            let ret = unsafe { libc::fsync(self.inner.fd) };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ShredError::Sync(os_errno(&err)));
            }
        }
    }

    fn inflight(&self) -> usize {
        self.inflight
    }

    fn shutdown(&mut self) {
        self.wake_writers();
        self.queued = 0;
        while self.inflight > 0 {
            self.collect();
            let ready = self.results.iter_mut().filter_map(Option::take).count();
            self.inflight = self.inflight.saturating_sub(ready);
            if self.inflight == 0 {
                break;
            }
            if let Err(e) = self.inner.events.wait() {
                tracing::warn!(error = %e, inflight = self.inflight, "writer drain aborted");
                break;
            }
        }
    }
}

impl Drop for WorkerBackend {
    fn drop(&mut self) {
        if self.inflight > 0 {
            self.shutdown();
        }
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.wake_writers();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Writer thread main loop.
fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match inner.work_queue.pop() {
            Some(req) => {
                let result = execute_write(inner.fd, &req);
                // At most one outstanding write per slot, and the result
                // queue holds one entry per slot, so this never overflows.
                if inner.result_queue.push(WriteCompletion { slot: req.slot, result }).is_err() {
                    tracing::error!(slot = req.slot.0, "write result queue overflow");
                }
                if let Err(e) = inner.events.notify() {
                    tracing::error!(error = %e, "completion wakeup failed");
                }
            }
            None => {
                // Woken early by unpark() on flush.
                thread::park_timeout(Duration::from_millis(1));
            }
        }
    }
}

/// Positioned write of the whole request. Returns bytes written or -errno.
fn execute_write(fd: RawFd, req: &WriteRequest) -> i64 {
    let mut done = 0usize;
    while done < req.len {
        // Safety: the submitter keeps `req.ptr[..req.len]` valid until the
        // completion is observed.
        let ret = unsafe {
            libc::pwrite(
                fd,
                req.ptr.add(done) as *const libc::c_void,
                req.len - done,
                (req.offset + done as u64) as libc::off_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return -(os_errno(&err) as i64);
        }
        if ret == 0 {
            break;
        }
        done += ret as usize;
    }
    done as i64
}
