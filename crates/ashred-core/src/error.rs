//! ashred error types.
//!
//! Every variant is fatal to the overwrite in progress. Nothing is retried
//! internally; the caller decides whether to run the whole operation again.

use std::fmt;

/// Linux errno used for short transfers (no OS error was reported).
pub const EIO: i32 = 5;
/// Linux errno used for configuration errors.
pub const EINVAL: i32 = 22;

/// Coarse classification of a [`ShredError`], for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Open,
    SizeQuery,
    SourceUnavailable,
    SourceRead,
    Write,
    Wait,
    Sync,
    Setup,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShredError {
    /// The target could not be opened.
    Open(i32),
    /// The extent length could not be determined.
    SizeQuery(i32),
    /// The random source could not be opened.
    SourceUnavailable(i32),
    /// Reading the random source failed.
    SourceRead(i32),
    /// The random source returned fewer bytes than requested.
    ShortRead { expected: usize, got: usize },
    /// An asynchronous write failed on submission or completion.
    Write { offset: u64, errno: i32 },
    /// An asynchronous write completed with fewer bytes than requested.
    ShortWrite { offset: u64, expected: usize, written: usize },
    /// Blocking on outstanding writes failed.
    Wait(i32),
    /// The durability barrier failed.
    Sync(i32),
    /// The write backend could not be created.
    Setup(i32),
    /// Rejected configuration.
    InvalidConfig(&'static str),
}

impl ShredError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_) => ErrorKind::Open,
            Self::SizeQuery(_) => ErrorKind::SizeQuery,
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::SourceRead(_) | Self::ShortRead { .. } => ErrorKind::SourceRead,
            Self::Write { .. } | Self::ShortWrite { .. } => ErrorKind::Write,
            Self::Wait(_) => ErrorKind::Wait,
            Self::Sync(_) => ErrorKind::Sync,
            Self::Setup(_) => ErrorKind::Setup,
            Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// The OS error number behind this error. Used as the process exit code.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Open(e)
            | Self::SizeQuery(e)
            | Self::SourceUnavailable(e)
            | Self::SourceRead(e)
            | Self::Wait(e)
            | Self::Sync(e)
            | Self::Setup(e) => *e,
            Self::Write { errno, .. } => *errno,
            Self::ShortRead { .. } | Self::ShortWrite { .. } => EIO,
            Self::InvalidConfig(_) => EINVAL,
        }
    }
}

impl fmt::Display for ShredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(e) => write!(f, "open target: errno {}", e),
            Self::SizeQuery(e) => write!(f, "extent size query: errno {}", e),
            Self::SourceUnavailable(e) => write!(f, "open random source: errno {}", e),
            Self::SourceRead(e) => write!(f, "read random source: errno {}", e),
            Self::ShortRead { expected, got } => {
                write!(f, "short read from random source: {} of {} bytes", got, expected)
            }
            Self::Write { offset, errno } => {
                write!(f, "write at offset {}: errno {}", offset, errno)
            }
            Self::ShortWrite { offset, expected, written } => write!(
                f,
                "short write at offset {}: {} of {} bytes",
                offset, written, expected
            ),
            Self::Wait(e) => write!(f, "wait for write completion: errno {}", e),
            Self::Sync(e) => write!(f, "flush writes: errno {}", e),
            Self::Setup(e) => write!(f, "write backend setup: errno {}", e),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ShredError {}

pub type Result<T> = std::result::Result<T, ShredError>;

/// Extract the errno from an `io::Error`, falling back to `EIO`.
#[inline]
pub fn os_errno(err: &std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(EIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_short_transfers() {
        let e = ShredError::ShortRead { expected: 8, got: 3 };
        assert_eq!(e.kind(), ErrorKind::SourceRead);
        assert_eq!(e.errno(), EIO);

        let e = ShredError::ShortWrite { offset: 4, expected: 4, written: 1 };
        assert_eq!(e.kind(), ErrorKind::Write);
        assert_eq!(e.errno(), EIO);
    }

    #[test]
    fn test_errno_passthrough() {
        assert_eq!(ShredError::Write { offset: 0, errno: 28 }.errno(), 28);
        assert_eq!(ShredError::Sync(5).errno(), 5);
        assert_eq!(ShredError::InvalidConfig("x").errno(), EINVAL);
    }

    #[test]
    fn test_display() {
        let e = ShredError::Write { offset: 4096, errno: 28 };
        assert_eq!(e.to_string(), "write at offset 4096: errno 28");
    }

    #[test]
    fn test_os_errno() {
        let io = std::io::Error::from_raw_os_error(13);
        assert_eq!(os_errno(&io), 13);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no errno");
        assert_eq!(os_errno(&io), EIO);
    }
}
