//! `MemoryBackend` — deterministic in-memory `WriteBackend`.
//!
//! For tests and benchmarks: no kernel, no threads. Submitted writes stay
//! in flight until `wait_any()` completes one of them (oldest or newest
//! first), or, with `complete_on_poll`, until their slot is polled. Bytes
//! are copied out of the caller's buffer at *completion* time, so a pump
//! that touched a buffer while its write was outstanding shows up as a
//! corrupted image.
//!
//! Failures are scripted by ordinal: the k-th submit, the k-th completion,
//! every wait, or the barrier.

use ashred_core::backend::{WriteBackend, WriteRequest, WriteStatus};
use ashred_core::buffer::SlotId;
use ashred_core::error::{Result, ShredError};

use std::collections::{BTreeMap, VecDeque};

/// Which outstanding write `wait_any()` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionOrder {
    /// Oldest submission first.
    #[default]
    Fifo,
    /// Newest submission first.
    Lifo,
}

/// One accepted write, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub slot: SlotId,
    pub offset: u64,
    pub len: usize,
}

/// Observable backend activity, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Submit(SlotId),
    Complete(SlotId),
    Harvest(SlotId),
    Sync,
}

#[derive(Default)]
pub struct MemoryBackend {
    order: CompletionOrder,
    complete_on_poll: bool,
    fail_submit: Option<(usize, i32)>,
    fail_completion: Option<(usize, i32)>,
    short_completion: Option<usize>,
    fail_wait: Option<i32>,
    fail_sync: Option<i32>,

    pending: VecDeque<WriteRequest>,
    ready: BTreeMap<SlotId, i64>,
    inflight: usize,
    max_inflight: usize,
    submits: usize,
    completions: usize,

    image: Vec<u8>,
    dispatched: Vec<DispatchRecord>,
    events: Vec<Event>,
    wait_calls: usize,
    sync_calls: usize,
    shutdown_calls: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: CompletionOrder) -> Self {
        self.order = order;
        self
    }

    /// Complete a slot's write the first time it is polled.
    pub fn complete_on_poll(mut self, enable: bool) -> Self {
        self.complete_on_poll = enable;
        self
    }

    /// The `nth` submit (1-based) is rejected with `errno`.
    pub fn fail_submit(mut self, nth: usize, errno: i32) -> Self {
        self.fail_submit = Some((nth, errno));
        self
    }

    /// The `nth` completion (1-based) reports `-errno`.
    pub fn fail_completion(mut self, nth: usize, errno: i32) -> Self {
        self.fail_completion = Some((nth, errno));
        self
    }

    /// The `nth` completion (1-based) reports one byte fewer than requested.
    pub fn short_completion(mut self, nth: usize) -> Self {
        self.short_completion = Some(nth);
        self
    }

    pub fn fail_wait(mut self, errno: i32) -> Self {
        self.fail_wait = Some(errno);
        self
    }

    pub fn fail_sync(mut self, errno: i32) -> Self {
        self.fail_sync = Some(errno);
        self
    }

    /// Bytes written so far, indexed by target offset.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn dispatched(&self) -> &[DispatchRecord] {
        &self.dispatched
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Highest number of simultaneously outstanding writes seen.
    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls
    }

    /// Finish `req`: copy its bytes into the image and park the result.
    fn complete(&mut self, req: WriteRequest) {
        self.completions += 1;
        let nth = self.completions;

        // Safety: per the `submit` contract the buffer is untouched until
        // the result is harvested, which can't happen before this point.
        let data = unsafe { std::slice::from_raw_parts(req.ptr, req.len) };
        let start = req.offset as usize;
        let end = start + req.len;
        if self.image.len() < end {
            self.image.resize(end, 0);
        }

        let result = match self.fail_completion {
            Some((k, errno)) if k == nth => -(errno as i64),
            _ if self.short_completion == Some(nth) => {
                let written = req.len.saturating_sub(1);
                self.image[start..start + written].copy_from_slice(&data[..written]);
                written as i64
            }
            _ => {
                self.image[start..end].copy_from_slice(data);
                req.len as i64
            }
        };

        self.events.push(Event::Complete(req.slot));
        self.ready.insert(req.slot, result);
    }

    fn complete_next(&mut self) -> bool {
        let next = match self.order {
            CompletionOrder::Fifo => self.pending.pop_front(),
            CompletionOrder::Lifo => self.pending.pop_back(),
        };
        match next {
            Some(req) => {
                self.complete(req);
                true
            }
            None => false,
        }
    }
}

impl WriteBackend for MemoryBackend {
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()> {
        self.submits += 1;
        if let Some((k, errno)) = self.fail_submit {
            if k == self.submits {
                return Err(ShredError::Write { offset: req.offset, errno });
            }
        }
        debug_assert!(
            !self.ready.contains_key(&req.slot) && self.pending.iter().all(|p| p.slot != req.slot),
            "slot {:?} submitted twice",
            req.slot
        );

        self.dispatched.push(DispatchRecord { slot: req.slot, offset: req.offset, len: req.len });
        self.events.push(Event::Submit(req.slot));
        self.pending.push_back(req);
        self.inflight += 1;
        self.max_inflight = self.max_inflight.max(self.inflight);
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        Ok(self.pending.len())
    }

    fn poll(&mut self, slot: SlotId) -> WriteStatus {
        if self.complete_on_poll {
            if let Some(pos) = self.pending.iter().position(|p| p.slot == slot) {
                if let Some(req) = self.pending.remove(pos) {
                    self.complete(req);
                }
            }
        }
        match self.ready.remove(&slot) {
            Some(result) => {
                self.inflight -= 1;
                self.events.push(Event::Harvest(slot));
                WriteStatus::Complete(result)
            }
            None => WriteStatus::InFlight,
        }
    }

    fn wait_any(&mut self) -> Result<()> {
        self.wait_calls += 1;
        if let Some(errno) = self.fail_wait {
            return Err(ShredError::Wait(errno));
        }
        if !self.ready.is_empty() || self.complete_next() {
            return Ok(());
        }
        Err(ShredError::Wait(libc::EINVAL))
    }

    fn sync(&mut self) -> Result<()> {
        self.sync_calls += 1;
        self.events.push(Event::Sync);
        match self.fail_sync {
            Some(errno) => Err(ShredError::Sync(errno)),
            None => Ok(()),
        }
    }

    fn inflight(&self) -> usize {
        self.inflight
    }

    fn shutdown(&mut self) {
        self.shutdown_calls += 1;
        while self.complete_next() {}
        self.ready.clear();
        self.inflight = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(slot: u32, buf: &[u8], offset: u64) -> WriteRequest {
        WriteRequest { slot: SlotId(slot), ptr: buf.as_ptr(), len: buf.len(), offset }
    }

    #[test]
    fn test_writes_stay_in_flight_until_wait() {
        let a = [1u8; 2];
        let mut b = MemoryBackend::new();
        unsafe { b.submit(req(0, &a, 0)).unwrap() };
        assert_eq!(b.poll(SlotId(0)), WriteStatus::InFlight);
        b.wait_any().unwrap();
        assert_eq!(b.poll(SlotId(0)), WriteStatus::Complete(2));
        assert_eq!(b.inflight(), 0);
        assert_eq!(b.image(), &[1, 1]);
    }

    #[test]
    fn test_lifo_completes_newest_first() {
        let a = [1u8; 2];
        let c = [2u8; 2];
        let mut b = MemoryBackend::new().order(CompletionOrder::Lifo);
        unsafe {
            b.submit(req(0, &a, 0)).unwrap();
            b.submit(req(1, &c, 2)).unwrap();
        }
        assert_eq!(b.max_inflight(), 2);
        b.wait_any().unwrap();
        assert_eq!(b.poll(SlotId(0)), WriteStatus::InFlight);
        assert_eq!(b.poll(SlotId(1)), WriteStatus::Complete(2));
    }

    #[test]
    fn test_scripted_failures() {
        let a = [1u8; 4];
        let mut b = MemoryBackend::new().complete_on_poll(true).fail_completion(2, 28).short_completion(3);
        unsafe { b.submit(req(0, &a, 0)).unwrap() };
        assert_eq!(b.poll(SlotId(0)), WriteStatus::Complete(4));
        unsafe { b.submit(req(0, &a, 4)).unwrap() };
        assert_eq!(b.poll(SlotId(0)), WriteStatus::Complete(-28));
        unsafe { b.submit(req(0, &a, 8)).unwrap() };
        assert_eq!(b.poll(SlotId(0)), WriteStatus::Complete(3));
    }

    #[test]
    fn test_wait_with_nothing_pending() {
        let mut b = MemoryBackend::new();
        assert_eq!(b.wait_any(), Err(ShredError::Wait(libc::EINVAL)));
    }

    #[test]
    fn test_shutdown_drains_without_sync() {
        let a = [9u8; 3];
        let mut b = MemoryBackend::new();
        unsafe { b.submit(req(0, &a, 0)).unwrap() };
        b.shutdown();
        assert_eq!(b.inflight(), 0);
        assert_eq!(b.sync_calls(), 0);
        assert_eq!(b.shutdown_calls(), 1);
        assert_eq!(b.image(), &[9, 9, 9]);
    }
}
