//! Restart-on-EINTR helpers
//!
//! Every blocking call in this crate goes through one of these so that an
//! interrupted system call is repeated in place and never surfaces to the
//! caller.

use nix::errno::{Errno, ErrnoSentinel};

/// Run `op` until it returns anything other than `Err(EINTR)`.
pub fn restartable<T, F>(mut op: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match op() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Run a C-style call that signals failure with `-1` and `errno`,
/// restarting on EINTR.
pub fn restartable_raw<S, F>(mut op: F) -> nix::Result<S>
where
    S: ErrnoSentinel + PartialEq<S>,
    F: FnMut() -> S,
{
    restartable(|| Errno::result(op()))
}

/// Store `errno` for the calling thread
#[cfg(test)]
pub(crate) fn set_errno(errno: Errno) {
    // SAFETY: __errno_location always returns the calling thread's slot.
    unsafe { *libc::__errno_location() = errno as i32 };
}
