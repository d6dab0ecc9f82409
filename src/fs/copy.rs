//! In-kernel bulk copy between two descriptors
//!
//! Bytes move from one descriptor to the other without passing through user
//! space. `copy_file_range` is tried first when the C library provides it;
//! if it cannot handle the descriptor pair at all the copy continues with
//! `sendfile` from wherever the file offsets were left. Both descriptors'
//! offsets advance by the bytes actually transferred.
//!
//! A copy given a cancellation flag works in small chunks and checks the
//! flag after every chunk, so a cancel request is noticed within one chunk.

use crate::config::TransferConfig;
use crate::error::{FsDispatchError, Result};
use crate::fs::retry::restartable_raw;
use crate::system::capability::{capabilities, Capabilities};
use libc::{c_int, c_uint};
use nix::errno::Errno;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

/// The platform call would block
pub const IOS_UNAVAILABLE: i32 = -2;
/// Direct copying is not supported on this platform
pub const IOS_UNSUPPORTED: i32 = -4;
/// An error was raised and should be propagated
pub const IOS_THROWN: i32 = -5;
/// The call does not work with the given descriptors
pub const IOS_UNSUPPORTED_CASE: i32 = -6;

/// C signature of `copy_file_range(2)`
pub type CopyFileRangeFn = unsafe extern "C" fn(
    fd_in: c_int,
    off_in: *mut i64,
    fd_out: c_int,
    off_out: *mut i64,
    len: usize,
    flags: c_uint,
) -> isize;

/// C signature of `sendfile(2)`
pub type SendfileFn =
    unsafe extern "C" fn(out_fd: c_int, in_fd: c_int, offset: *mut libc::off_t, count: usize) -> isize;

#[cfg(target_os = "linux")]
const DEFAULT_SENDFILE: SendfileFn = libc::sendfile;

#[cfg(not(target_os = "linux"))]
const DEFAULT_SENDFILE: SendfileFn = no_sendfile;

#[cfg(not(target_os = "linux"))]
unsafe extern "C" fn no_sendfile(_: c_int, _: c_int, _: *mut libc::off_t, _: usize) -> isize {
    -1
}

/// How a copy ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Everything up to end of file was copied
    Success,
    /// The destination is non-blocking and full; retry when it is writable
    WouldBlock,
    /// Neither primitive works for this descriptor pair
    UnsupportedForThisCase,
    /// In-kernel copy is not available on this platform
    UnsupportedOnPlatform,
    /// The cancellation flag was observed between chunks
    Cancelled,
    /// The kernel reported an error
    Failed(Errno),
}

impl CopyOutcome {
    /// Integer status: `0` on success, otherwise one of the `IOS_*` codes
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::WouldBlock => IOS_UNAVAILABLE,
            Self::UnsupportedForThisCase => IOS_UNSUPPORTED_CASE,
            Self::UnsupportedOnPlatform => IOS_UNSUPPORTED,
            Self::Cancelled | Self::Failed(_) => IOS_THROWN,
        }
    }

    /// Whether the whole source was copied
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Turn `Cancelled` and `Failed` into errors; every other outcome is
    /// returned unchanged for the caller to act on.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Cancelled => Err(FsDispatchError::Cancelled),
            Self::Failed(errno) => Err(FsDispatchError::os("Copy failed", errno)),
            other => Ok(other),
        }
    }
}

/// Kernel primitive that moved the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPrimitive {
    /// `copy_file_range(2)`
    CopyFileRange,
    /// `sendfile(2)`
    Sendfile,
}

/// Result of one copy call with transfer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// How the copy ended
    pub outcome: CopyOutcome,
    /// Bytes transferred before it ended
    pub bytes_copied: u64,
    /// The primitive in use when it ended
    pub primitive: Option<CopyPrimitive>,
}

enum Stop {
    Cancelled,
    Os(Errno),
}

/// Tiered in-kernel copy engine
#[derive(Clone, Copy)]
pub struct CopyEngine {
    copy_file_range: Option<CopyFileRangeFn>,
    sendfile: SendfileFn,
    transfer: TransferConfig,
}

impl CopyEngine {
    /// Engine with the given primary primitive and the C library's `sendfile`
    pub fn new(copy_file_range: Option<CopyFileRangeFn>) -> Self {
        Self {
            copy_file_range,
            sendfile: DEFAULT_SENDFILE,
            transfer: TransferConfig::default(),
        }
    }

    /// Use whatever the given probe found
    pub fn from_capabilities(caps: &Capabilities) -> Self {
        Self::new(caps.copy_file_range())
    }

    /// Use the process-wide probe
    pub fn system() -> Self {
        Self::from_capabilities(capabilities())
    }

    /// Override chunk sizes; zero or over-large chunks are rejected
    pub fn with_transfer_config(mut self, transfer: TransferConfig) -> Result<Self> {
        transfer.validate()?;
        self.transfer = transfer;
        Ok(self)
    }

    /// Replace the secondary primitive
    pub fn with_sendfile(mut self, sendfile: SendfileFn) -> Self {
        self.sendfile = sendfile;
        self
    }

    /// Whether `copy_file_range` will be tried first
    pub fn has_in_kernel_copy(&self) -> bool {
        self.copy_file_range.is_some()
    }

    /// Copy from `src`'s current offset to end of file into `dst`
    pub fn copy(&self, dst: impl AsFd, src: impl AsFd, cancel: Option<&AtomicBool>) -> CopyOutcome {
        self.copy_with_report(dst, src, cancel).outcome
    }

    /// Like [`CopyEngine::copy`], also reporting bytes moved and the primitive
    pub fn copy_with_report(
        &self,
        dst: impl AsFd,
        src: impl AsFd,
        cancel: Option<&AtomicBool>,
    ) -> CopyReport {
        self.transfer_fds(dst.as_fd().as_raw_fd(), src.as_fd().as_raw_fd(), cancel)
    }

    #[cfg(not(target_os = "linux"))]
    fn transfer_fds(&self, _dst: RawFd, _src: RawFd, _cancel: Option<&AtomicBool>) -> CopyReport {
        CopyReport {
            outcome: CopyOutcome::UnsupportedOnPlatform,
            bytes_copied: 0,
            primitive: None,
        }
    }

    #[cfg(target_os = "linux")]
    fn transfer_fds(&self, dst: RawFd, src: RawFd, cancel: Option<&AtomicBool>) -> CopyReport {
        let chunk = self.transfer.chunk_size(cancel.is_some());
        let mut bytes_copied = 0u64;

        if let Some(copy_file_range) = self.copy_file_range {
            let res = pump(&mut bytes_copied, cancel, || {
                // SAFETY: null offsets make the kernel use and advance the
                // descriptors' own file positions.
                restartable_raw(|| unsafe {
                    copy_file_range(src, std::ptr::null_mut(), dst, std::ptr::null_mut(), chunk, 0)
                })
            });
            let outcome = match res {
                Ok(()) => Some(CopyOutcome::Success),
                Err(Stop::Cancelled) => Some(CopyOutcome::Cancelled),
                Err(Stop::Os(Errno::EINVAL | Errno::ENOSYS | Errno::EXDEV)) => None,
                Err(Stop::Os(errno)) => Some(CopyOutcome::Failed(errno)),
            };
            let outcome = outcome.or_else(|| is_cancelled(cancel).then_some(CopyOutcome::Cancelled));
            if let Some(outcome) = outcome {
                return CopyReport {
                    outcome,
                    bytes_copied,
                    primitive: Some(CopyPrimitive::CopyFileRange),
                };
            }
            tracing::debug!(
                src,
                dst,
                bytes_copied,
                "copy_file_range cannot handle descriptors, falling back to sendfile"
            );
        }

        let sendfile = self.sendfile;
        let res = pump(&mut bytes_copied, cancel, || {
            // SAFETY: a null offset makes the kernel use and advance the
            // input descriptor's own file position.
            restartable_raw(|| unsafe { sendfile(dst, src, std::ptr::null_mut(), chunk) })
        });
        let outcome = match res {
            Ok(()) => CopyOutcome::Success,
            Err(Stop::Cancelled) => CopyOutcome::Cancelled,
            Err(Stop::Os(Errno::EAGAIN)) => CopyOutcome::WouldBlock,
            Err(Stop::Os(Errno::EINVAL | Errno::ENOSYS)) => CopyOutcome::UnsupportedForThisCase,
            Err(Stop::Os(errno)) => CopyOutcome::Failed(errno),
        };
        CopyReport {
            outcome,
            bytes_copied,
            primitive: Some(CopyPrimitive::Sendfile),
        }
    }
}

impl std::fmt::Debug for CopyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyEngine")
            .field("copy_file_range", &self.copy_file_range.is_some())
            .field("transfer", &self.transfer)
            .finish()
    }
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
}

/// Call `step` until it reports end of file, an error, or cancellation.
fn pump<F>(bytes_copied: &mut u64, cancel: Option<&AtomicBool>, mut step: F) -> std::result::Result<(), Stop>
where
    F: FnMut() -> nix::Result<isize>,
{
    loop {
        let sent = step().map_err(Stop::Os)?;
        *bytes_copied += sent as u64;
        if is_cancelled(cancel) {
            return Err(Stop::Cancelled);
        }
        if sent == 0 {
            return Ok(());
        }
    }
}

/// [`CopyEngine::copy`] using the process-wide probe
pub fn copy(dst: impl AsFd, src: impl AsFd, cancel: Option<&AtomicBool>) -> CopyOutcome {
    CopyEngine::system().copy(dst, src, cancel)
}
