//! File system dispatch module
//!
//! Extended stat with a legacy fallback, mount table iteration, in-kernel
//! bulk copy and access-pattern hints.

pub mod advise;
pub mod attributes;
pub mod copy;
pub mod mount;
pub mod retry;
pub mod statx;

pub use advise::{advise, Advice};
pub use attributes::{FileAttributes, FileType};
pub use copy::{copy, CopyEngine, CopyOutcome, CopyPrimitive, CopyReport};
pub use mount::{find_mount, read_mount_table, MountEntry, MountTable};
pub use retry::{restartable, restartable_raw};
pub use statx::{stat_fd, stat_path, ExtendedStat, FileMetadata, StatError, Timestamp};
