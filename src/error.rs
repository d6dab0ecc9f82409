//! Error types for fsdispatch
//!
//! Every failure this crate reports carries the exact OS error code the
//! kernel returned. Interrupted calls are retried before they ever reach
//! these types, and "facility not available" outcomes are sentinels on the
//! individual operations rather than errors.

use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fsdispatch operations
#[derive(Error, Debug)]
pub enum FsDispatchError {
    /// The kernel reported a failure
    #[error("{context}: {errno}")]
    Os {
        /// What was being attempted
        context: String,
        /// The raw OS error
        #[source]
        errno: Errno,
    },

    /// The kernel reported a failure for a specific path
    #[error("'{path}': {errno}")]
    Path {
        /// Path the call operated on
        path: PathBuf,
        /// The raw OS error
        #[source]
        errno: Errno,
    },

    /// A cancellable copy observed its cancellation flag
    #[error("Copy cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FsDispatchError {
    /// Create an OS error with a short description of the failed operation
    pub fn os(context: impl Into<String>, errno: Errno) -> Self {
        Self::Os {
            context: context.into(),
            errno,
        }
    }

    /// Create an OS error for a path
    pub fn path(path: impl Into<PathBuf>, errno: Errno) -> Self {
        Self::Path {
            path: path.into(),
            errno,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// The raw OS error code carried by this error.
    ///
    /// Cancellation reports `ECANCELED`, matching what the copy layer would
    /// have raised as an OS error.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Os { errno, .. } | Self::Path { errno, .. } => Some(*errno as i32),
            Self::Cancelled => Some(Errno::ECANCELED as i32),
            Self::ConfigError(_) => None,
        }
    }

    /// Check if this error is a cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for fsdispatch operations
pub type Result<T> = std::result::Result<T, FsDispatchError>;

impl From<std::io::Error> for FsDispatchError {
    fn from(err: std::io::Error) -> Self {
        let errno = err
            .raw_os_error()
            .map(Errno::from_raw)
            .unwrap_or(Errno::EIO);
        FsDispatchError::os(err.to_string(), errno)
    }
}

impl From<Errno> for FsDispatchError {
    fn from(errno: Errno) -> Self {
        FsDispatchError::os(errno.desc(), errno)
    }
}

impl From<serde_json::Error> for FsDispatchError {
    fn from(err: serde_json::Error) -> Self {
        FsDispatchError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding context to `nix::Result`
pub trait ErrnoResultExt<T> {
    /// Describe the operation that failed
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Attach the path the failed call operated on
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrnoResultExt<T> for nix::Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FsDispatchError::os(context, e))
    }

    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| FsDispatchError::path(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_keeps_code() {
        let err = FsDispatchError::os("setmntent", Errno::ENOENT);
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_reports_ecanceled() {
        let err = FsDispatchError::Cancelled;
        assert!(err.is_cancelled());
        assert_eq!(err.raw_os_error(), Some(libc::ECANCELED));
    }

    #[test]
    fn test_with_path() {
        let res: nix::Result<()> = Err(Errno::EACCES);
        let err = res.with_path("/etc/shadow").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
        assert!(err.to_string().contains("/etc/shadow"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::from_raw_os_error(libc::EXDEV);
        let err: FsDispatchError = io_err.into();
        assert_eq!(err.raw_os_error(), Some(libc::EXDEV));
    }
}
