//! The overwrite pump.
//!
//! Drives a fixed pool of buffers through
//!
//! ```text
//!   Filling ──dispatch──▶ Draining ──harvest + refill──▶ Filling ──▶ …
//! ```
//!
//! until the write cursor reaches the end of the extent:
//!
//! ```text
//! while off < len {
//!     1. Scan the pool in slot order:
//!          Filling  → submit write [off, off + min(B, len - off)), advance off;
//!                     stop the scan once off == len
//!          Draining → poll; if done: check result, refill from the source
//!     2. Flush queued submissions to the kernel
//!     3. If the scan neither dispatched nor harvested → block until any write completes
//! }
//! drain every Draining buffer, then fsync
//! ```
//!
//! Dispatch order is strictly ascending and ranges never overlap;
//! completions may arrive in any order. The barrier runs only once every
//! write has been harvested.

use ashred_core::backend::{WriteBackend, WriteRequest, WriteStatus};
use ashred_core::buffer::{Buffer, BufferPool, BufferState, SlotId};
use ashred_core::config::PumpConfig;
use ashred_core::error::{Result, ShredError};
use ashred_core::source::RandomSource;

/// Counters for one pump run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Writes dispatched.
    pub writes: u64,
    /// Buffers refilled after their write completed (priming excluded).
    pub refills: u64,
    /// Times the scan found nothing to do and blocked.
    pub waits: u64,
}

/// Single-threaded scheduler of overlapping writes.
///
/// If the pump is dropped while writes are outstanding (error return or
/// unwinding), it waits them out through `WriteBackend::shutdown()` before
/// the pool is freed.
pub struct OverwritePump<B: WriteBackend, S: RandomSource> {
    backend: B,
    source: S,
    pool: BufferPool,
    primed: bool,
    stats: PumpStats,
}

impl<B: WriteBackend, S: RandomSource> OverwritePump<B, S> {
    /// Fails with `InvalidConfig` if `config` doesn't validate.
    pub fn new(backend: B, source: S, config: &PumpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            source,
            pool: BufferPool::new(config),
            primed: false,
            stats: PumpStats::default(),
        })
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Fill every buffer from the source. Nothing is written until this succeeds.
    pub fn prime(&mut self) -> Result<()> {
        for i in 0..self.pool.len() {
            refill(&mut self.source, self.pool.get_mut(SlotId(i as u32)))?;
        }
        self.primed = true;
        tracing::debug!(
            buffers = self.pool.len(),
            buffer_size = self.pool.buffer_size(),
            "buffer pool primed"
        );
        Ok(())
    }

    /// Overwrite `[0, len)` and sync. Returns the bytes written, which equals `len`.
    ///
    /// Primes the pool first if `prime()` hasn't been called.
    pub fn run(&mut self, len: u64) -> Result<u64> {
        if !self.primed {
            self.prime()?;
        }
        match self.pump(len) {
            Ok(total) => {
                tracing::debug!(
                    total,
                    writes = self.stats.writes,
                    waits = self.stats.waits,
                    "extent overwritten and synced"
                );
                Ok(total)
            }
            Err(e) => {
                tracing::error!(error = %e, inflight = self.backend.inflight(), "overwrite aborted");
                self.abort();
                Err(e)
            }
        }
    }

    fn pump(&mut self, len: u64) -> Result<u64> {
        let buffer_size = self.pool.buffer_size() as u64;
        let mut off = 0u64;
        let mut total = 0u64;

        while off < len {
            let mut progressed = 0usize;

            for i in 0..self.pool.len() {
                let slot = SlotId(i as u32);
                match self.pool.get(slot).state() {
                    BufferState::Filling => {
                        let n = buffer_size.min(len - off) as usize;
                        self.dispatch(slot, off, n)?;
                        off += n as u64;
                        progressed += 1;
                        if off >= len {
                            break;
                        }
                    }
                    BufferState::Draining { .. } => {
                        if let Some(written) = self.harvest(slot)? {
                            total += written;
                            refill(&mut self.source, self.pool.get_mut(slot))?;
                            self.stats.refills += 1;
                            progressed += 1;
                        }
                    }
                }
            }

            self.backend.flush()?;

            if progressed == 0 {
                tracing::trace!(off, inflight = self.backend.inflight(), "all buffers in flight, waiting");
                self.stats.waits += 1;
                self.backend.wait_any()?;
            }
        }

        // Cursor is at the end: wait out whatever is still in flight. Every
        // pass harvests all completed slots, so a wait always has a write
        // left to block on.
        self.backend.flush()?;
        while self.pool.draining() > 0 {
            let mut harvested = 0usize;
            for i in 0..self.pool.len() {
                if let Some(written) = self.harvest(SlotId(i as u32))? {
                    total += written;
                    harvested += 1;
                }
            }
            if harvested == 0 {
                self.stats.waits += 1;
                self.backend.wait_any()?;
            }
        }

        self.backend.sync()?;
        debug_assert_eq!(total, len);
        Ok(total)
    }

    /// Submit the slot's first `len` bytes at `offset` and mark it `Draining`.
    fn dispatch(&mut self, slot: SlotId, offset: u64, len: usize) -> Result<()> {
        let buf = self.pool.get_mut(slot);
        let req = WriteRequest {
            slot,
            ptr: buf.as_ptr(),
            len,
            offset,
        };
        // Safety: the buffer is marked Draining right after a successful
        // submit, and a Draining buffer hands out no references until the
        // completion is harvested (or the backend is shut down on abort).
        unsafe { self.backend.submit(req)? };
        buf.mark_draining(offset, len);
        self.stats.writes += 1;
        Ok(())
    }

    /// Non-blocking check of one Draining slot.
    ///
    /// `Ok(None)` while the write is in flight. On completion the slot is
    /// back to `Filling` whether the write succeeded or not.
    fn harvest(&mut self, slot: SlotId) -> Result<Option<u64>> {
        if !self.pool.get(slot).is_draining() {
            return Ok(None);
        }
        let res = match self.backend.poll(slot) {
            WriteStatus::InFlight => return Ok(None),
            WriteStatus::Complete(res) => res,
        };
        let Some((offset, len)) = self.pool.get_mut(slot).mark_filling() else {
            return Ok(None);
        };

        if res < 0 {
            return Err(ShredError::Write { offset, errno: (-res) as i32 });
        }
        if (res as usize) < len {
            return Err(ShredError::ShortWrite { offset, expected: len, written: res as usize });
        }
        Ok(Some(res as u64))
    }

    /// Wait out outstanding writes so the pool can be released.
    fn abort(&mut self) {
        if self.pool.draining() == 0 && self.backend.inflight() == 0 {
            return;
        }
        self.backend.shutdown();
        for i in 0..self.pool.len() {
            self.pool.get_mut(SlotId(i as u32)).mark_filling();
        }
    }
}

impl<B: WriteBackend, S: RandomSource> Drop for OverwritePump<B, S> {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Refill a Filling buffer to capacity. A short fill is fatal.
fn refill<S: RandomSource>(source: &mut S, buf: &mut Buffer) -> Result<()> {
    debug_assert!(!buf.is_draining());
    if let Some(data) = buf.filling_mut() {
        let expected = data.len();
        let got = source.fill(data)?;
        if got != expected {
            return Err(ShredError::ShortRead { expected, got });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ashred_core::error::{ErrorKind, EIO};
    use ashred_module::memory_backend::{CompletionOrder, DispatchRecord, Event, MemoryBackend};

    /// Emits 0, 1, 2, … (wrapping) across fills.
    #[derive(Default)]
    struct CountingSource {
        next: u8,
        fills: usize,
        fail_on: Option<usize>,
        short_on: Option<usize>,
    }

    impl RandomSource for CountingSource {
        fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.fills += 1;
            if self.fail_on == Some(self.fills) {
                return Err(ShredError::SourceRead(EIO));
            }
            let n = if self.short_on == Some(self.fills) { buf.len() - 1 } else { buf.len() };
            for b in &mut buf[..n] {
                *b = self.next;
                self.next = self.next.wrapping_add(1);
            }
            Ok(n)
        }
    }

    fn run_with(backend: &mut MemoryBackend, source: &mut CountingSource, len: u64, b: usize, n: usize) -> Result<u64> {
        let mut pump = OverwritePump::new(backend, source, &PumpConfig::new(b, n))?;
        pump.prime()?;
        pump.run(len)
    }

    fn run(backend: &mut MemoryBackend, len: u64, b: usize, n: usize) -> Result<u64> {
        run_with(backend, &mut CountingSource::default(), len, b, n)
    }

    fn ranges(backend: &MemoryBackend) -> Vec<(u64, usize)> {
        backend.dispatched().iter().map(|d| (d.offset, d.len)).collect()
    }

    #[test]
    fn test_small_extent_scenario() {
        let mut backend = MemoryBackend::new();
        let total = run(&mut backend, 10, 4, 2).unwrap();

        assert_eq!(total, 10);
        assert_eq!(ranges(&backend), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(backend.sync_calls(), 1);

        // The barrier comes after every harvest.
        let events = backend.events();
        assert_eq!(events.last(), Some(&Event::Sync));
        let harvests = events.iter().filter(|e| matches!(e, Event::Harvest(_))).count();
        assert_eq!(harvests, 3);
    }

    #[test]
    fn test_full_coverage() {
        for &len in &[1u64, 3, 4, 5, 17, 64, 100] {
            for &b in &[1usize, 3, 4, 7, 16] {
                for &n in &[1usize, 2, 3, 8] {
                    for order in [CompletionOrder::Fifo, CompletionOrder::Lifo] {
                        for eager in [false, true] {
                            let mut backend = MemoryBackend::new().order(order).complete_on_poll(eager);
                            let total = run(&mut backend, len, b, n).unwrap();
                            let ctx = format!("len={} b={} n={} {:?} eager={}", len, b, n, order, eager);

                            assert_eq!(total, len, "{}", ctx);
                            assert_eq!(backend.image().len() as u64, len, "{}", ctx);
                            assert!(backend.max_inflight() <= n, "{}", ctx);
                            assert_eq!(backend.sync_calls(), 1, "{}", ctx);

                            let mut expect_off = 0u64;
                            for &(off, l) in &ranges(&backend) {
                                assert_eq!(off, expect_off, "gap or overlap: {}", ctx);
                                assert!(l >= 1 && l <= b, "{}", ctx);
                                expect_off += l as u64;
                            }
                            assert_eq!(expect_off, len, "{}", ctx);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_length_extent() {
        let mut backend = MemoryBackend::new();
        let total = run(&mut backend, 0, 4, 2).unwrap();
        assert_eq!(total, 0);
        assert!(backend.dispatched().is_empty());
        assert_eq!(backend.sync_calls(), 1);
        assert_eq!(backend.wait_calls(), 0);
    }

    #[test]
    fn test_tail_clipping() {
        let mut backend = MemoryBackend::new();
        run(&mut backend, 10, 4, 3).unwrap();
        let r = ranges(&backend);
        let clipped: Vec<_> = r.iter().filter(|(_, l)| *l != 4).collect();
        assert_eq!(clipped, vec![&(8, 2)]);
        assert_eq!(r.last(), Some(&(8, 2)));

        let mut backend = MemoryBackend::new();
        run(&mut backend, 12, 4, 3).unwrap();
        assert!(ranges(&backend).iter().all(|(_, l)| *l == 4));
    }

    #[test]
    fn test_unused_buffers_at_tail() {
        let mut backend = MemoryBackend::new();
        run(&mut backend, 4, 4, 8).unwrap();
        assert_eq!(
            backend.dispatched(),
            &[DispatchRecord { slot: SlotId(0), offset: 0, len: 4 }]
        );
    }

    #[test]
    fn test_bounded_concurrency() {
        let mut backend = MemoryBackend::new().order(CompletionOrder::Lifo);
        run(&mut backend, 1000, 4, 3).unwrap();
        assert_eq!(backend.max_inflight(), 3);
    }

    #[test]
    fn test_fault_on_kth_completion() {
        let mut backend = MemoryBackend::new().fail_completion(3, 28);
        let err = run(&mut backend, 40, 4, 2).unwrap_err();

        assert_eq!(err, ShredError::Write { offset: 8, errno: 28 });
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(backend.sync_calls(), 0);
        // The other buffer's write was still in flight and got waited out.
        assert_eq!(backend.shutdown_calls(), 1);
        assert_eq!(backend.inflight(), 0);

        // Nothing was dispatched after the failed harvest.
        let events = backend.events();
        let failed = events.iter().rposition(|e| matches!(e, Event::Harvest(_))).unwrap();
        assert!(!events[failed..].iter().any(|e| matches!(e, Event::Submit(_))));
    }

    #[test]
    fn test_fault_on_first_completion_sole_write() {
        let mut backend = MemoryBackend::new().fail_completion(1, 5);
        let err = run(&mut backend, 3, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::Write { offset: 0, errno: 5 });
        assert_eq!(backend.dispatched().len(), 1);
        assert_eq!(backend.sync_calls(), 0);
        assert_eq!(backend.shutdown_calls(), 0);
    }

    #[test]
    fn test_short_write_is_fatal() {
        let mut backend = MemoryBackend::new().short_completion(1);
        let err = run(&mut backend, 16, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::ShortWrite { offset: 0, expected: 4, written: 3 });
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(backend.sync_calls(), 0);
    }

    #[test]
    fn test_submit_failure() {
        let mut backend = MemoryBackend::new().fail_submit(2, 11);
        let err = run(&mut backend, 16, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::Write { offset: 4, errno: 11 });
        assert_eq!(backend.dispatched().len(), 1);
        assert_eq!(backend.shutdown_calls(), 1);
        assert_eq!(backend.sync_calls(), 0);
    }

    #[test]
    fn test_wait_failure() {
        let mut backend = MemoryBackend::new().fail_wait(4);
        let err = run(&mut backend, 16, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::Wait(4));
        assert_eq!(err.kind(), ErrorKind::Wait);
        assert_eq!(backend.sync_calls(), 0);
        assert_eq!(backend.inflight(), 0);
    }

    #[test]
    fn test_sync_failure() {
        let mut backend = MemoryBackend::new().fail_sync(5);
        let err = run(&mut backend, 16, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::Sync(5));
        // Every byte was written before the barrier failed.
        assert_eq!(backend.image().len(), 16);
        assert_eq!(backend.sync_calls(), 1);
    }

    #[test]
    fn test_priming_failure_writes_nothing() {
        let mut backend = MemoryBackend::new();
        let mut source = CountingSource { fail_on: Some(2), ..Default::default() };
        let err = run_with(&mut backend, &mut source, 16, 4, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceRead);
        assert!(backend.dispatched().is_empty());
        assert_eq!(backend.sync_calls(), 0);
    }

    #[test]
    fn test_short_refill_is_fatal() {
        let mut backend = MemoryBackend::new();
        // Fills 1-2 prime the pool; fill 3 is the first refill.
        let mut source = CountingSource { short_on: Some(3), ..Default::default() };
        let err = run_with(&mut backend, &mut source, 40, 4, 2).unwrap_err();
        assert_eq!(err, ShredError::ShortRead { expected: 4, got: 3 });
        assert_eq!(err.kind(), ErrorKind::SourceRead);
        assert_eq!(backend.sync_calls(), 0);
        assert_eq!(backend.inflight(), 0);
    }

    #[test]
    fn test_refill_gives_fresh_data_per_dispatch() {
        for order in [CompletionOrder::Fifo, CompletionOrder::Lifo] {
            let mut backend = MemoryBackend::new().order(order);
            run(&mut backend, 40, 4, 2).unwrap();

            let image = backend.image();
            let mut starts = Vec::new();
            for d in backend.dispatched() {
                let chunk = &image[d.offset as usize..d.offset as usize + d.len];
                // Each range is one whole fill of the counting source.
                assert_eq!(chunk[0] % 4, 0, "{:?}", d);
                for w in chunk.windows(2) {
                    assert_eq!(w[1], w[0].wrapping_add(1), "{:?}", d);
                }
                starts.push(chunk[0]);
            }
            let mut unique = starts.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), starts.len(), "a fill was written twice: {:?}", starts);
        }
    }

    #[test]
    fn test_drain_harvests_later_slot_first() {
        // [8, 12) goes to slot 0 after the refill, so at the drain slot 1
        // holds the older write and completes before slot 0.
        let mut backend = MemoryBackend::new().order(CompletionOrder::Fifo);
        let mut source = CountingSource::default();
        let (total, stats) = {
            let mut pump = OverwritePump::new(&mut backend, &mut source, &PumpConfig::new(4, 2)).unwrap();
            let total = pump.run(12).unwrap();
            (total, pump.stats())
        };

        assert_eq!(total, 12);
        assert_eq!(ranges(&backend), vec![(0, 4), (4, 4), (8, 4)]);
        assert_eq!(backend.dispatched()[2].slot, SlotId(0));
        assert!(stats.waits <= stats.writes, "{:?}", stats);
        assert_eq!(backend.wait_calls() as u64, stats.waits);

        let harvests: Vec<_> = backend
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Harvest(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(harvests, vec![SlotId(0), SlotId(1), SlotId(0)]);
        assert_eq!(backend.events().last(), Some(&Event::Sync));
    }

    #[test]
    fn test_waits_bounded_by_writes() {
        for order in [CompletionOrder::Fifo, CompletionOrder::Lifo] {
            for &(len, b, n) in &[(12u64, 4usize, 2usize), (100, 7, 3), (1000, 16, 8)] {
                let mut backend = MemoryBackend::new().order(order);
                let mut source = CountingSource::default();
                let stats = {
                    let mut pump = OverwritePump::new(&mut backend, &mut source, &PumpConfig::new(b, n)).unwrap();
                    pump.run(len).unwrap();
                    pump.stats()
                };
                assert!(stats.waits <= stats.writes, "{:?} len={} b={} n={}", order, len, b, n);
            }
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut backend = MemoryBackend::new();
        let mut source = CountingSource::default();
        let err = OverwritePump::new(&mut backend, &mut source, &PumpConfig::new(0, 2)).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Config));

        let err = OverwritePump::new(&mut backend, &mut source, &PumpConfig::new(4, 0)).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Config));
        assert!(backend.dispatched().is_empty());
    }

    #[test]
    fn test_stats() {
        let mut backend = MemoryBackend::new();
        let mut source = CountingSource::default();
        let stats = {
            let mut pump = OverwritePump::new(&mut backend, &mut source, &PumpConfig::new(4, 2)).unwrap();
            pump.run(10).unwrap();
            pump.stats()
        };
        assert_eq!(stats.writes, 3);
        assert_eq!(stats.refills, 1);
        assert!(stats.waits >= 1);
        // Priming fills two buffers, one refill reuses a buffer for [8, 10).
        assert_eq!(source.fills, 3);
    }
}
