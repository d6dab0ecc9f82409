//! Access-pattern hints
//!
//! A hint that fails never stops the caller, so the kernel status is handed
//! back untouched.

use libc::{c_int, off_t};
use std::os::fd::RawFd;

/// `POSIX_FADV_*` advice values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    /// No particular pattern
    Normal,
    /// Expect sequential reads
    Sequential,
    /// Expect random access
    Random,
    /// Data will be accessed once
    NoReuse,
    /// Data will be needed soon
    WillNeed,
    /// Data will not be needed soon
    DontNeed,
}

impl Advice {
    /// Raw advice code
    pub fn code(self) -> c_int {
        match self {
            Self::Normal => libc::POSIX_FADV_NORMAL,
            Self::Sequential => libc::POSIX_FADV_SEQUENTIAL,
            Self::Random => libc::POSIX_FADV_RANDOM,
            Self::NoReuse => libc::POSIX_FADV_NOREUSE,
            Self::WillNeed => libc::POSIX_FADV_WILLNEED,
            Self::DontNeed => libc::POSIX_FADV_DONTNEED,
        }
    }
}

/// Pass a hint for `[offset, offset + len)` to the kernel.
///
/// Returns `posix_fadvise`'s own result: `0` or an error number. A `len` of
/// zero covers everything from `offset` to end of file.
pub fn advise(fd: RawFd, offset: i64, len: i64, advice: c_int) -> c_int {
    // SAFETY: posix_fadvise only inspects its integer arguments; an invalid
    // descriptor is reported as EBADF.
    unsafe { libc::posix_fadvise(fd, offset as off_t, len as off_t, advice) }
}
