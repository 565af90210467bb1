//! ashred configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Command-line flags (applied by the binary through the builders)
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```
//! use ashred_core::config::{BackendKind, ByteSize, ShredConfig};
//!
//! let config = ShredConfig::default()
//!     .buffer_size(ByteSize::kib(256))
//!     .buffer_count(16)
//!     .backend(BackendKind::Uring);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::env::{env_get_opt, env_get_str};
use crate::error::{Result, ShredError};

pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;
pub const DEFAULT_BUFFER_COUNT: usize = 8;
pub const DEFAULT_WORKER_THREADS: usize = 4;
pub const DEFAULT_SOURCE_PATH: &str = "/dev/urandom";

/// Upper bound on the pool size. Also bounds the io_uring SQ size.
pub const MAX_BUFFER_COUNT: usize = 4096;

/// A byte count that parses human suffixes: `131072`, `128K`, `128KiB`,
/// `4M`, `1G`. Suffixes are binary (powers of 1024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub usize);

impl ByteSize {
    pub const fn kib(n: usize) -> Self {
        Self(n * 1024)
    }

    pub const fn mib(n: usize) -> Self {
        Self(n * 1024 * 1024)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        if digits.is_empty() {
            return Err("missing byte count");
        }
        let n: usize = digits.parse().map_err(|_| "byte count out of range")?;
        let shift = match suffix.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 0,
            "k" | "kb" | "kib" => 10,
            "m" | "mb" | "mib" => 20,
            "g" | "gb" | "gib" => 30,
            _ => return Err("unknown size suffix"),
        };
        n.checked_mul(1usize << shift)
            .map(ByteSize)
            .ok_or("byte count out of range")
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which asynchronous write facility to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// io_uring, falling back to the worker pool if the ring can't be set up.
    #[default]
    Auto,
    /// io_uring only.
    Uring,
    /// Blocking `pwrite` on a fixed pool of writer threads.
    Workers,
}

impl FromStr for BackendKind {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "uring" | "io_uring" | "io-uring" => Ok(Self::Uring),
            "workers" | "threads" => Ok(Self::Workers),
            _ => Err("backend must be one of: auto, uring, workers"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Uring => "uring",
            Self::Workers => "workers",
        })
    }
}

/// Buffer pool shape handed to the overwrite pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Bytes per buffer (`B`). Also the largest single write.
    pub buffer_size: usize,
    /// Number of buffers (`N`). Bounds outstanding writes.
    pub buffer_count: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

impl PumpConfig {
    pub fn new(buffer_size: usize, buffer_count: usize) -> Self {
        Self { buffer_size, buffer_count }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ShredError::InvalidConfig("buffer_size must be at least 1"));
        }
        if self.buffer_size > u32::MAX as usize {
            return Err(ShredError::InvalidConfig("buffer_size exceeds u32::MAX"));
        }
        if self.buffer_count == 0 {
            return Err(ShredError::InvalidConfig("buffer_count must be at least 1"));
        }
        if self.buffer_count > MAX_BUFFER_COUNT {
            return Err(ShredError::InvalidConfig("buffer_count exceeds 4096"));
        }
        Ok(())
    }
}

/// Full configuration for one `overwrite()` call.
#[derive(Debug, Clone)]
pub struct ShredConfig {
    pub pump: PumpConfig,
    pub backend: BackendKind,
    /// Writer threads for `BackendKind::Workers`.
    pub worker_threads: usize,
    /// Entropy device the buffers are filled from.
    pub source_path: PathBuf,
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            pump: PumpConfig::default(),
            backend: BackendKind::Auto,
            worker_threads: DEFAULT_WORKER_THREADS,
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
        }
    }
}

impl ShredConfig {
    /// Defaults with environment overrides applied.
    ///
    /// | Variable              | Field            |
    /// |-----------------------|------------------|
    /// | `ASHRED_BUFFER_SIZE`  | `pump.buffer_size` (accepts `128K` etc.) |
    /// | `ASHRED_BUFFER_COUNT` | `pump.buffer_count` |
    /// | `ASHRED_BACKEND`      | `backend` |
    /// | `ASHRED_WORKERS`      | `worker_threads` |
    /// | `ASHRED_SOURCE`       | `source_path` |
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(size) = env_get_opt::<ByteSize>("ASHRED_BUFFER_SIZE") {
            config.pump.buffer_size = size.get();
        }
        if let Some(count) = env_get_opt("ASHRED_BUFFER_COUNT") {
            config.pump.buffer_count = count;
        }
        if let Some(kind) = env_get_opt("ASHRED_BACKEND") {
            config.backend = kind;
        }
        if let Some(n) = env_get_opt("ASHRED_WORKERS") {
            config.worker_threads = n;
        }
        config.source_path = PathBuf::from(env_get_str("ASHRED_SOURCE", DEFAULT_SOURCE_PATH));
        config
    }

    pub fn buffer_size(mut self, size: ByteSize) -> Self {
        self.pump.buffer_size = size.get();
        self
    }

    pub fn buffer_count(mut self, n: usize) -> Self {
        self.pump.buffer_count = n;
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.pump.validate()?;
        if self.worker_threads == 0 {
            return Err(ShredError::InvalidConfig("worker_threads must be at least 1"));
        }
        Ok(())
    }
}
