//! Extended stat (`statx`) adapter
//!
//! `statx` reports nanosecond timestamps and the file's birth time, which the
//! classic `stat` family cannot. It is only usable when the C library the
//! process runs against exports it, so the function pointer is an injected
//! strategy: [`ExtendedStat::system`] uses the probed symbol, tests can hand
//! in their own.
//!
//! Device numbers come back from the kernel as separate major/minor halves
//! and are always recombined with [`makedev`] before they reach a caller.

use crate::fs::retry::restartable_raw;
use crate::system::capability::{capabilities, Capabilities};
use libc::{c_char, c_int, c_uint};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use thiserror::Error;

/// The mask every query asks for
pub const STATX_ALL: c_uint = libc::STATX_BASIC_STATS | libc::STATX_BTIME;

const EMPTY_PATH: &[u8] = b"\0";

/// C signature of `statx(2)`
pub type StatxFn = unsafe extern "C" fn(
    dirfd: c_int,
    pathname: *const c_char,
    flags: c_int,
    mask: c_uint,
    statxbuf: *mut libc::statx,
) -> c_int;

/// Combine a major/minor pair into a `dev_t`, glibc `gnu_dev_makedev` layout
pub const fn makedev(major: u32, minor: u32) -> u64 {
    let major = major as u64;
    let minor = minor as u64;
    ((major & 0x0000_0fff) << 8)
        | ((major & 0xffff_f000) << 32)
        | (minor & 0x0000_00ff)
        | ((minor & 0xffff_ff00) << 12)
}

/// Major half of a `dev_t`
pub const fn major(dev: u64) -> u32 {
    (((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff)) as u32
}

/// Minor half of a `dev_t`
pub const fn minor(dev: u64) -> u32 {
    (((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff)) as u32
}

/// Seconds plus nanoseconds since the epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds
    pub sec: i64,
    /// Nanoseconds within the second
    pub nsec: u32,
}

impl Timestamp {
    /// Create a timestamp
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Convert for use with the `filetime` crate
    pub fn to_file_time(self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.sec, self.nsec)
    }
}

impl From<libc::statx_timestamp> for Timestamp {
    fn from(ts: libc::statx_timestamp) -> Self {
        Self::new(ts.tv_sec, ts.tv_nsec)
    }
}

/// Decoded result of a stat-family call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File type and permission bits
    pub mode: u32,
    /// Inode number
    pub ino: u64,
    /// Device containing the file
    pub dev: u64,
    /// Device this file represents, for special files
    pub rdev: u64,
    /// Hard link count
    pub nlink: u64,
    /// Owner
    pub uid: u32,
    /// Group
    pub gid: u32,
    /// Size in bytes
    pub size: u64,
    /// Last access
    pub atime: Timestamp,
    /// Last modification
    pub mtime: Timestamp,
    /// Last status change
    pub ctime: Timestamp,
    /// Creation, when the filesystem reports it through `statx`
    pub btime: Option<Timestamp>,
}

impl FileMetadata {
    /// Decode a filled-in `statx` buffer
    pub fn from_statx(buf: &libc::statx) -> Self {
        let btime = if buf.stx_mask & libc::STATX_BTIME != 0 {
            Some(buf.stx_btime.into())
        } else {
            None
        };

        Self {
            mode: u32::from(buf.stx_mode),
            ino: buf.stx_ino,
            dev: makedev(buf.stx_dev_major, buf.stx_dev_minor),
            rdev: makedev(buf.stx_rdev_major, buf.stx_rdev_minor),
            nlink: u64::from(buf.stx_nlink),
            uid: buf.stx_uid,
            gid: buf.stx_gid,
            size: buf.stx_size,
            atime: buf.stx_atime.into(),
            mtime: buf.stx_mtime.into(),
            ctime: buf.stx_ctime.into(),
            btime,
        }
    }

    /// Decode a legacy `struct stat`; birth time is never available here
    pub fn from_stat(st: &libc::stat) -> Self {
        Self {
            mode: st.st_mode as u32,
            ino: st.st_ino as u64,
            dev: st.st_dev as u64,
            rdev: st.st_rdev as u64,
            nlink: st.st_nlink as u64,
            uid: st.st_uid,
            gid: st.st_gid,
            size: st.st_size as u64,
            atime: Timestamp::new(st.st_atime as i64, st.st_atime_nsec as u32),
            mtime: Timestamp::new(st.st_mtime as i64, st.st_mtime_nsec as u32),
            ctime: Timestamp::new(st.st_ctime as i64, st.st_ctime_nsec as u32),
            btime: None,
        }
    }
}

/// Why an extended stat produced no metadata
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatError {
    /// `statx` is not available; use the legacy stat path
    #[error("statx is not available")]
    Unsupported,
    /// The kernel rejected the call
    #[error(transparent)]
    Os(#[from] Errno),
}

impl StatError {
    /// The OS error code, if the kernel reported one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Unsupported => None,
            Self::Os(errno) => Some(*errno as i32),
        }
    }
}

/// `statx` dispatcher
#[derive(Clone, Copy)]
pub struct ExtendedStat {
    statx: Option<StatxFn>,
}

impl ExtendedStat {
    /// Use the given strategy; `None` makes every query `Unsupported`
    pub const fn new(statx: Option<StatxFn>) -> Self {
        Self { statx }
    }

    /// Use whatever the given probe found
    pub fn from_capabilities(caps: &Capabilities) -> Self {
        Self::new(caps.statx())
    }

    /// Use the process-wide probe
    pub fn system() -> Self {
        Self::from_capabilities(capabilities())
    }

    /// Whether queries will reach the kernel
    pub fn is_supported(&self) -> bool {
        self.statx.is_some()
    }

    /// Stat a path, optionally without following a final symlink
    pub fn stat_path(
        &self,
        path: &Path,
        follow_symlinks: bool,
    ) -> Result<FileMetadata, StatError> {
        let Some(statx) = self.statx else {
            return Err(StatError::Unsupported);
        };

        let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)?;
        let mut flags = libc::AT_STATX_SYNC_AS_STAT;
        if !follow_symlinks {
            flags |= libc::AT_SYMLINK_NOFOLLOW;
        }
        call_statx(statx, libc::AT_FDCWD, cpath.as_ptr(), flags)
    }

    /// Stat an open descriptor
    pub fn stat_fd(&self, fd: impl AsFd) -> Result<FileMetadata, StatError> {
        let Some(statx) = self.statx else {
            return Err(StatError::Unsupported);
        };

        // An empty path with AT_EMPTY_PATH targets `fd` itself.
        let flags = libc::AT_EMPTY_PATH | libc::AT_STATX_SYNC_AS_STAT;
        call_statx(
            statx,
            fd.as_fd().as_raw_fd(),
            EMPTY_PATH.as_ptr() as *const c_char,
            flags,
        )
    }
}

fn call_statx(
    statx: StatxFn,
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
) -> Result<FileMetadata, StatError> {
    // SAFETY: all-zero is a valid `struct statx`.
    let mut buf: libc::statx = unsafe { std::mem::zeroed() };
    // SAFETY: `path` is NUL-terminated and outlives the call; `buf` is a
    // properly sized, writable statx buffer.
    restartable_raw(|| unsafe { statx(dirfd, path, flags, STATX_ALL, &mut buf) })?;
    Ok(FileMetadata::from_statx(&buf))
}

/// [`ExtendedStat::stat_path`] using the process-wide probe
pub fn stat_path(path: &Path, follow_symlinks: bool) -> Result<FileMetadata, StatError> {
    ExtendedStat::system().stat_path(path, follow_symlinks)
}

/// [`ExtendedStat::stat_fd`] using the process-wide probe
pub fn stat_fd(fd: impl AsFd) -> Result<FileMetadata, StatError> {
    ExtendedStat::system().stat_fd(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::retry::set_errno;
    use crate::system::capability::capability_flags;
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![0xABu8; size]).unwrap();
        path
    }

    #[test]
    fn test_unsupported_makes_no_call() {
        // A missing path would be ENOENT if anything reached the kernel.
        let stat = ExtendedStat::new(None);
        assert!(!stat.is_supported());
        assert_eq!(
            stat.stat_path(Path::new("/nonexistent/fsdispatch"), true),
            Err(StatError::Unsupported)
        );
        let file = tempfile::tempfile().unwrap();
        assert_eq!(stat.stat_fd(&file), Err(StatError::Unsupported));
    }

    #[test]
    fn test_path_and_fd_agree() {
        if !capability_flags().extended_stat {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", 4096);

        let by_path = stat_path(&path, true).unwrap();
        let file = File::open(&path).unwrap();
        let by_fd = stat_fd(&file).unwrap();

        assert_eq!(by_path.mode, by_fd.mode);
        assert_eq!(by_path.ino, by_fd.ino);
        assert_eq!(by_path.dev, by_fd.dev);
        assert_eq!(by_path.size, 4096);
        assert_eq!(by_path.size, by_fd.size);
        assert_eq!(by_path.atime, by_fd.atime);
        assert_eq!(by_path.mtime, by_fd.mtime);
        assert_eq!(by_path.ctime, by_fd.ctime);
    }

    #[test]
    fn test_symlink_follow_policy() {
        if !capability_flags().extended_stat {
            return;
        }
        let dir = TempDir::new().unwrap();
        let target = create_test_file(dir.path(), "target.bin", 100);
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let own = stat_path(&link, false).unwrap();
        assert_eq!(own.mode & libc::S_IFMT, libc::S_IFLNK);
        assert_eq!(own.size, target.as_os_str().len() as u64);

        let followed = stat_path(&link, true).unwrap();
        assert_eq!(followed.mode & libc::S_IFMT, libc::S_IFREG);
        assert_eq!(followed.size, 100);
    }

    #[test]
    fn test_missing_path_reports_errno() {
        if !capability_flags().extended_stat {
            return;
        }
        let err = stat_path(Path::new("/nonexistent/fsdispatch"), true).unwrap_err();
        assert_eq!(err, StatError::Os(Errno::ENOENT));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_interior_nul_is_einval() {
        let stat = ExtendedStat::new(Some(fake_statx));
        let err = stat
            .stat_path(Path::new(std::ffi::OsStr::from_bytes(b"a\0b")), true)
            .unwrap_err();
        assert_eq!(err, StatError::Os(Errno::EINVAL));
    }

    static FAKE_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn fake_statx(
        _dirfd: c_int,
        _pathname: *const c_char,
        _flags: c_int,
        mask: c_uint,
        statxbuf: *mut libc::statx,
    ) -> c_int {
        if FAKE_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            set_errno(Errno::EINTR);
            return -1;
        }
        let buf = &mut *statxbuf;
        buf.stx_mask = mask;
        buf.stx_mode = (libc::S_IFCHR | 0o620) as u16;
        buf.stx_ino = 42;
        buf.stx_size = 7;
        buf.stx_nlink = 1;
        buf.stx_dev_major = 259;
        buf.stx_dev_minor = 0x1_2345;
        buf.stx_rdev_major = 4;
        buf.stx_rdev_minor = 1;
        buf.stx_btime.tv_sec = 1_700_000_000;
        buf.stx_btime.tv_nsec = 5;
        0
    }

    #[test]
    fn test_decodes_and_retries_eintr() {
        let stat = ExtendedStat::new(Some(fake_statx));
        let before = FAKE_CALLS.load(Ordering::SeqCst);
        let meta = stat.stat_path(Path::new("/dev/tty1"), true).unwrap();
        assert_eq!(FAKE_CALLS.load(Ordering::SeqCst) - before, 2);

        assert_eq!(meta.ino, 42);
        assert_eq!(meta.size, 7);
        assert_eq!(meta.dev, makedev(259, 0x1_2345));
        assert_eq!(major(meta.dev), 259);
        assert_eq!(minor(meta.dev), 0x1_2345);
        assert_eq!(meta.rdev, makedev(4, 1));
        assert_eq!(meta.btime, Some(Timestamp::new(1_700_000_000, 5)));
    }

    static SEEN_FLAGS: AtomicI32 = AtomicI32::new(-1);
    static SEEN_EMPTY_PATH: AtomicI32 = AtomicI32::new(-1);

    unsafe extern "C" fn flag_recording_statx(
        _dirfd: c_int,
        pathname: *const c_char,
        flags: c_int,
        _mask: c_uint,
        _statxbuf: *mut libc::statx,
    ) -> c_int {
        SEEN_FLAGS.store(flags, Ordering::SeqCst);
        SEEN_EMPTY_PATH.store((*pathname == 0) as i32, Ordering::SeqCst);
        0
    }

    #[test]
    fn test_flags_per_call_form() {
        let stat = ExtendedStat::new(Some(flag_recording_statx));

        let meta = stat.stat_path(Path::new("/tmp"), false).unwrap();
        assert_eq!(meta.btime, None);
        let flags = SEEN_FLAGS.load(Ordering::SeqCst);
        assert_ne!(flags & libc::AT_SYMLINK_NOFOLLOW, 0);

        stat.stat_path(Path::new("/tmp"), true).unwrap();
        let flags = SEEN_FLAGS.load(Ordering::SeqCst);
        assert_eq!(flags & libc::AT_SYMLINK_NOFOLLOW, 0);

        let file = tempfile::tempfile().unwrap();
        stat.stat_fd(&file).unwrap();
        let flags = SEEN_FLAGS.load(Ordering::SeqCst);
        assert_eq!(flags & libc::AT_SYMLINK_NOFOLLOW, 0);
        assert_ne!(flags & libc::AT_EMPTY_PATH, 0);
        assert_eq!(SEEN_EMPTY_PATH.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_makedev_matches_libc(maj in any::<u32>(), min in any::<u32>()) {
            #[allow(unused_unsafe)]
            let expected = unsafe { libc::makedev(maj, min) } as u64;
            prop_assert_eq!(makedev(maj, min), expected);
            prop_assert_eq!(major(makedev(maj, min)), maj);
            prop_assert_eq!(minor(makedev(maj, min)), min);
        }
    }
}
