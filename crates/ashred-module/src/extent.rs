//! Extent sizing.
//!
//! Regular files report their logical size through metadata. Special
//! files don't: a block device's `st_size` is 0, so the media size comes
//! from the `BLKGETSIZE64` ioctl instead.

use ashred_core::error::{os_errno, Result, ShredError};
use ashred_core::extent::{Extent, ExtentKind};

use std::fs::File;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;

const BLK_IOC_MAGIC: u8 = 0x12;

// ioctl number: _IOR(0x12, 114, size_t). size_t is 64-bit on the targets we build for.
nix::ioctl_read!(blkgetsize64, BLK_IOC_MAGIC, 114, u64);

/// Determine the byte length to overwrite for an open target.
///
/// Fails with `SizeQuery` if metadata can't be read or the device-size
/// query fails. There is no fallback to a partial size.
pub fn query_extent(file: &File) -> Result<Extent> {
    let meta = file
        .metadata()
        .map_err(|e| ShredError::SizeQuery(os_errno(&e)))?;

    let ft = meta.file_type();
    let kind = if ft.is_file() {
        ExtentKind::File
    } else if ft.is_block_device() {
        ExtentKind::BlockDevice
    } else if ft.is_char_device() {
        ExtentKind::CharDevice
    } else {
        ExtentKind::Other
    };

    let len = match kind {
        ExtentKind::BlockDevice | ExtentKind::CharDevice => device_size(file)?,
        ExtentKind::File | ExtentKind::Other => meta.len(),
    };

    tracing::debug!(len, %kind, "extent sized");
    Ok(Extent::new(len, kind))
}

/// Media size of a device via `BLKGETSIZE64`.
pub fn device_size(file: &File) -> Result<u64> {
    let mut size: u64 = 0;
    // Safety: the fd is open for the duration of the call and `size` is a
    // valid u64 out-parameter, which is what BLKGETSIZE64 writes.
    unsafe { blkgetsize64(file.as_raw_fd(), &mut size) }
        .map_err(|e| ShredError::SizeQuery(e as i32))?;
    Ok(size)
}
