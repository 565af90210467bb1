//! Random source abstraction.
//!
//! The pump refills buffers synchronously, on its own thread, between
//! scans of the pool. A source is treated as infinite and always ready.
//!
//! # Implementors
//!
//! - `DevRandom` (ashred-module): reads an entropy device such as
//!   `/dev/urandom`.
//! - Deterministic generators in tests.

use crate::error::Result;

pub trait RandomSource {
    /// Fill `buf` from the source, blocking.
    ///
    /// Returns the number of bytes placed in `buf`. Anything short of
    /// `buf.len()` means the source ran dry; the pump treats it as fatal.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<S: RandomSource + ?Sized> RandomSource for &mut S {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).fill(buf)
    }
}
