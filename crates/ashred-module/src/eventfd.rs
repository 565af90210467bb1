//! `EventFd` — completion wakeups for `WorkerBackend`.
//!
//! Writer threads `notify()` after publishing a completion; the pump
//! thread blocks in `wait()` until the counter is non-zero. Multiple
//! notifications before the pump wakes coalesce into one wakeup
//! (eventfd counter semantics), which is fine because the pump rescans
//! every slot after waking.

use ashred_core::error::{Result, ShredError};

use std::io;
use std::os::unix::io::RawFd;

pub struct EventFd {
    fd: RawFd,
}

impl EventFd {
    /// Create a new non-blocking, close-on-exec eventfd. Owned; closed on Drop.
    pub fn create() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(ShredError::Setup(last_errno()));
        }
        Ok(Self { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Add one to the counter. Never blocks.
    pub fn notify(&self) -> io::Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // EAGAIN means the counter is saturated, so a wakeup is already pending.
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Block until the counter is non-zero, then reset it.
    pub fn wait(&self) -> io::Result<()> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
        self.drain()
    }

    /// Reset the counter without blocking.
    pub fn drain(&self) -> io::Result<()> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd); }
            self.fd = -1;
        }
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}
