//! # ashred-executor — The Overwrite Pump
//!
//! Wires the pieces together for one target:
//!
//! ```text
//! open target ─▶ query extent ─▶ open source ─▶ open backend ─▶ prime pool
//!             ─▶ pump [0, len) ─▶ drain ─▶ fsync ─▶ report
//! ```
//!
//! The pump itself (`pump::OverwritePump`) is generic over
//! `WriteBackend` and `RandomSource`. `overwrite()` uses the production
//! pieces from ashred-module; `overwrite_with()` takes any pair, which is
//! how tests and benches drive it with `MemoryBackend`.

pub mod pump;

pub use pump::{OverwritePump, PumpStats};

use ashred_core::backend::WriteBackend;
use ashred_core::config::{PumpConfig, ShredConfig};
use ashred_core::error::{os_errno, Result, ShredError};
use ashred_core::source::RandomSource;
use ashred_module::any_backend::AnyBackend;
use ashred_module::extent::query_extent;
use ashred_module::urandom::DevRandom;

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of a completed shred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShredReport {
    pub bytes: u64,
    /// Wall time from opening the target to the end of the final sync.
    pub elapsed: Duration,
}

impl ShredReport {
    /// Bytes per second. Zero when no time was measured.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Open `path` write-only, without creating or truncating it.
pub fn open_target(path: &Path) -> Result<File> {
    File::options()
        .write(true)
        .open(path)
        .map_err(|e| ShredError::Open(os_errno(&e)))
}

/// Overwrite the whole of `target` with random bytes and sync it.
///
/// Returns the number of bytes written, equal to the target's size.
pub fn overwrite(target: &File, config: &ShredConfig) -> Result<u64> {
    config.validate()?;

    let extent = query_extent(target)?;
    let source = DevRandom::open(&config.source_path)?;
    let backend = AnyBackend::open(target.as_raw_fd(), config)?;

    tracing::info!(
        len = extent.len,
        kind = %extent.kind,
        backend = %backend.kind(),
        buffer_size = config.pump.buffer_size,
        buffer_count = config.pump.buffer_count,
        direct_source = source.is_direct(),
        "overwriting"
    );

    overwrite_with(backend, source, extent.len, &config.pump)
}

/// Run the pump over `[0, len)` with caller-supplied backend and source.
pub fn overwrite_with<B, S>(backend: B, source: S, len: u64, config: &PumpConfig) -> Result<u64>
where
    B: WriteBackend,
    S: RandomSource,
{
    let mut pump = OverwritePump::new(backend, source, config)?;
    pump.prime()?;
    pump.run(len)
}

/// Open `path`, overwrite it, and time the whole thing.
pub fn shred_path(path: &Path, config: &ShredConfig) -> Result<ShredReport> {
    let start = Instant::now();
    let target = open_target(path)?;
    let bytes = overwrite(&target, config)?;
    let report = ShredReport { bytes, elapsed: start.elapsed() };

    tracing::info!(
        path = %path.display(),
        bytes = report.bytes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "shred complete"
    );
    Ok(report)
}
