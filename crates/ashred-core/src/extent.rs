//! Target extent description.

use std::fmt;

/// What kind of object the target handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    /// Regular file; length is the logical size.
    File,
    /// Block device; length is the media size.
    BlockDevice,
    /// Character (raw) device; length is the media size.
    CharDevice,
    /// Anything else; length is whatever metadata reports.
    Other,
}

impl fmt::Display for ExtentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::BlockDevice => "block device",
            Self::CharDevice => "character device",
            Self::Other => "other",
        })
    }
}

/// Byte range `[0, len)` to overwrite.
///
/// Computed once before the first write and never re-queried. The target
/// must not be resized while an overwrite is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub len: u64,
    pub kind: ExtentKind,
}

impl Extent {
    pub fn new(len: u64, kind: ExtentKind) -> Self {
        Self { len, kind }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
