//! `DevRandom` — default `RandomSource` implementation.
//!
//! Reads an entropy device (default `/dev/urandom`) with plain blocking
//! `read(2)` calls. Character devices are opened with `O_DIRECT` when the
//! kernel allows it, so fill data never passes through the page cache;
//! Linux refuses `O_DIRECT` on most character devices (`EINVAL`), in which
//! case the source is reopened without it.

use ashred_core::error::{os_errno, Result, ShredError};
use ashred_core::source::RandomSource;

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

pub struct DevRandom {
    file: File,
    direct: bool,
}

impl DevRandom {
    /// Open `path` read-only.
    ///
    /// Fails with `SourceUnavailable` if the source can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_device = std::fs::metadata(path)
            .map(|m| m.file_type().is_char_device())
            .unwrap_or(false);

        if is_device {
            match open_with(path, libc::O_DIRECT) {
                Ok(file) => return Ok(Self { file, direct: true }),
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                    tracing::debug!(
                        path = %path.display(),
                        "O_DIRECT rejected by random source, reading buffered"
                    );
                }
                Err(e) => return Err(ShredError::SourceUnavailable(os_errno(&e))),
            }
        }

        let file = open_with(path, 0).map_err(|e| ShredError::SourceUnavailable(os_errno(&e)))?;
        Ok(Self { file, direct: false })
    }

    /// Whether the source was opened with `O_DIRECT`.
    pub fn is_direct(&self) -> bool {
        self.direct
    }
}

fn open_with(path: &Path, flags: libc::c_int) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CLOEXEC | flags)
        .open(path)
}

impl RandomSource for DevRandom {
    /// Reads until `buf` is full or the source hits end-of-file.
    ///
    /// The kernel may hand back less than asked (large urandom reads are
    /// split at signal checks), so partial reads are retried here. Only a
    /// real end-of-stream shows up as a short count to the caller.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ShredError::SourceRead(os_errno(&e))),
            }
        }
        Ok(filled)
    }
}
