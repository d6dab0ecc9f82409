//! # fsdispatch - capability-probed kernel file primitives
//!
//! fsdispatch sits between higher-level file handling code and a handful of
//! Linux system calls that are not always present. The C library is probed
//! once per process; every operation afterwards goes through whichever
//! primitive was found, falling back to the portable call when needed.
//!
//! ## Features
//!
//! - **Extended stat**: `statx` with birth time, or an explicit "unsupported"
//!   so callers can use `stat`
//! - **Mount table**: iterate `/proc/mounts` or any fstab-format file
//! - **Bulk copy**: `copy_file_range`, then `sendfile`, with cooperative
//!   cancellation between chunks
//! - **Advice**: raw `posix_fadvise` pass-through
//!
//! ## Quick Start
//!
//! ```no_run
//! use fsdispatch::fs::{CopyEngine, CopyOutcome, FileAttributes};
//! use std::fs::File;
//! use std::path::Path;
//!
//! let attrs = FileAttributes::get(Path::new("/etc/hostname"), true).unwrap();
//! println!("{} bytes, created {:?}", attrs.size(), attrs.creation_time());
//!
//! let src = File::open("/etc/hostname").unwrap();
//! let dst = File::create("/tmp/hostname.copy").unwrap();
//! match CopyEngine::system().copy(&dst, &src, None) {
//!     CopyOutcome::Success => println!("copied"),
//!     other => println!("copy ended with code {}", other.code()),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod system;

// Re-export commonly used types
pub use config::{DispatchConfig, TransferConfig};
pub use error::{FsDispatchError, Result};
pub use fs::{CopyEngine, CopyOutcome, ExtendedStat, FileAttributes, MountTable};
pub use system::{capabilities, Capabilities};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use fsdispatch::prelude::*;
    //! ```

    pub use crate::config::{DispatchConfig, MountConfig, TransferConfig};
    pub use crate::error::{FsDispatchError, Result};
    pub use crate::fs::{
        advise, find_mount, Advice, CopyEngine, CopyOutcome, CopyReport, ExtendedStat,
        FileAttributes, FileMetadata, FileType, MountEntry, MountTable, StatError,
    };
    pub use crate::system::{capabilities, capability_flags, KernelVersion};
}
