//! `AnyBackend` — runtime choice between io_uring and the writer pool.
//!
//! `BackendKind::Auto` tries io_uring first and falls back to the writer
//! pool when the ring can't be created (old kernel, seccomp policy,
//! `io_uring_disabled` sysctl).

use ashred_core::backend::{WriteBackend, WriteRequest, WriteStatus};
use ashred_core::buffer::SlotId;
use ashred_core::config::{BackendKind, ShredConfig};
use ashred_core::error::Result;

use crate::uring_backend::{UringBackend, UringBackendConfig};
use crate::worker_backend::WorkerBackend;

use std::os::unix::io::RawFd;

pub enum AnyBackend {
    Uring(UringBackend),
    Workers(WorkerBackend),
}

impl AnyBackend {
    /// Open the backend selected by `config` for writes to `fd`.
    pub fn open(fd: RawFd, config: &ShredConfig) -> Result<Self> {
        let slots = config.pump.buffer_count;
        let uring = || UringBackend::new(fd, slots, UringBackendConfig::for_pool(slots));
        let workers = || WorkerBackend::new(fd, slots, config.worker_threads);

        match config.backend {
            BackendKind::Uring => uring().map(Self::Uring),
            BackendKind::Workers => workers().map(Self::Workers),
            BackendKind::Auto => match uring() {
                Ok(b) => Ok(Self::Uring(b)),
                Err(e) => {
                    tracing::warn!(error = %e, "io_uring unavailable, falling back to writer threads");
                    workers().map(Self::Workers)
                }
            },
        }
    }

    /// The concrete backend in use.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Uring(_) => BackendKind::Uring,
            Self::Workers(_) => BackendKind::Workers,
        }
    }
}

impl WriteBackend for AnyBackend {
    unsafe fn submit(&mut self, req: WriteRequest) -> Result<()> {
        match self {
            Self::Uring(b) => b.submit(req),
            Self::Workers(b) => b.submit(req),
        }
    }

    fn flush(&mut self) -> Result<usize> {
        match self {
            Self::Uring(b) => b.flush(),
            Self::Workers(b) => b.flush(),
        }
    }

    fn poll(&mut self, slot: SlotId) -> WriteStatus {
        match self {
            Self::Uring(b) => b.poll(slot),
            Self::Workers(b) => b.poll(slot),
        }
    }

    fn wait_any(&mut self) -> Result<()> {
        match self {
            Self::Uring(b) => b.wait_any(),
            Self::Workers(b) => b.wait_any(),
        }
    }

    fn sync(&mut self) -> Result<()> {
        match self {
            Self::Uring(b) => b.sync(),
            Self::Workers(b) => b.sync(),
        }
    }

    fn inflight(&self) -> usize {
        match self {
            Self::Uring(b) => b.inflight(),
            Self::Workers(b) => b.inflight(),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Self::Uring(b) => b.shutdown(),
            Self::Workers(b) => b.shutdown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_explicit_workers() {
        let file = File::options().write(true).open("/dev/null").unwrap();
        let config = ShredConfig::default().backend(BackendKind::Workers).buffer_count(2);
        let backend = AnyBackend::open(file.as_raw_fd(), &config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Workers);
    }

    #[test]
    fn test_auto_always_yields_a_backend() {
        let file = File::options().write(true).open("/dev/null").unwrap();
        let config = ShredConfig::default().buffer_count(2);
        let backend = AnyBackend::open(file.as_raw_fd(), &config).unwrap();
        assert!(matches!(backend.kind(), BackendKind::Uring | BackendKind::Workers));
    }
}
