//! File attributes with statx/legacy dispatch
//!
//! Callers ask for attributes of a path or descriptor and get the same
//! [`FileMetadata`] shape either way. When `statx` is available it is used
//! and the birth time comes along; otherwise the classic `stat` family fills
//! in everything but the birth time.

use crate::error::{ErrnoResultExt, FsDispatchError, Result};
use crate::fs::retry::restartable;
use crate::fs::statx::{ExtendedStat, FileMetadata, StatError, Timestamp};
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;

/// Kind of file, decoded from the mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Anything else
    Unknown,
}

impl FileType {
    /// Decode the `S_IFMT` bits of a mode
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Self::Regular,
            libc::S_IFDIR => Self::Directory,
            libc::S_IFLNK => Self::Symlink,
            libc::S_IFCHR => Self::CharDevice,
            libc::S_IFBLK => Self::BlockDevice,
            libc::S_IFIFO => Self::Fifo,
            libc::S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// Attributes of one file at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    meta: FileMetadata,
    from_statx: bool,
}

impl FileAttributes {
    /// Attributes of `path`, following a final symlink if `follow_links`
    pub fn get(path: &Path, follow_links: bool) -> Result<Self> {
        Self::get_with(&ExtendedStat::system(), path, follow_links)
    }

    /// Like [`FileAttributes::get`] with an explicit statx strategy
    pub fn get_with(stat: &ExtendedStat, path: &Path, follow_links: bool) -> Result<Self> {
        match stat.stat_path(path, follow_links) {
            Ok(meta) => Ok(Self {
                meta,
                from_statx: true,
            }),
            Err(StatError::Unsupported) => {
                let st = if follow_links {
                    restartable(|| nix::sys::stat::stat(path))
                } else {
                    restartable(|| nix::sys::stat::lstat(path))
                }
                .with_path(path)?;
                Ok(Self::legacy(FileMetadata::from_stat(&st)))
            }
            Err(StatError::Os(errno)) => Err(FsDispatchError::path(path, errno)),
        }
    }

    /// Attributes of an open descriptor
    pub fn from_fd(fd: impl AsFd) -> Result<Self> {
        Self::from_fd_with(&ExtendedStat::system(), fd)
    }

    /// Like [`FileAttributes::from_fd`] with an explicit statx strategy
    pub fn from_fd_with(stat: &ExtendedStat, fd: impl AsFd) -> Result<Self> {
        let fd = fd.as_fd();
        match stat.stat_fd(fd) {
            Ok(meta) => Ok(Self {
                meta,
                from_statx: true,
            }),
            Err(StatError::Unsupported) => {
                let st = restartable(|| nix::sys::stat::fstat(fd.as_raw_fd())).context("fstat")?;
                Ok(Self::legacy(FileMetadata::from_stat(&st)))
            }
            Err(StatError::Os(errno)) => Err(FsDispatchError::os("statx", errno)),
        }
    }

    fn legacy(meta: FileMetadata) -> Self {
        Self {
            meta,
            from_statx: false,
        }
    }

    /// The decoded metadata
    pub fn metadata(&self) -> &FileMetadata {
        &self.meta
    }

    /// Take the decoded metadata
    pub fn into_metadata(self) -> FileMetadata {
        self.meta
    }

    /// Whether `statx` produced these attributes
    pub fn is_statx(&self) -> bool {
        self.from_statx
    }

    /// Kind of file
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.meta.mode)
    }

    /// Permission bits, including setuid/setgid/sticky
    pub fn permissions(&self) -> u32 {
        self.meta.mode & 0o7777
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.meta.size
    }

    /// `(dev, ino)` pair identifying the file
    pub fn file_key(&self) -> (u64, u64) {
        (self.meta.dev, self.meta.ino)
    }

    /// Last modification
    pub fn last_modified_time(&self) -> filetime::FileTime {
        self.meta.mtime.to_file_time()
    }

    /// Last access
    pub fn last_access_time(&self) -> filetime::FileTime {
        self.meta.atime.to_file_time()
    }

    /// Last status change
    pub fn last_change_time(&self) -> filetime::FileTime {
        self.meta.ctime.to_file_time()
    }

    /// Birth time if the filesystem reported one, else last modification
    pub fn creation_time(&self) -> filetime::FileTime {
        self.birth_time()
            .unwrap_or(self.meta.mtime)
            .to_file_time()
    }

    /// Birth time exactly as reported
    pub fn birth_time(&self) -> Option<Timestamp> {
        self.meta.btime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::capability::capability_flags;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![0x5Au8; size]).unwrap();
        path
    }

    #[test]
    fn test_legacy_path() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.txt", 321);

        let attrs = FileAttributes::get_with(&ExtendedStat::new(None), &path, true).unwrap();
        assert!(!attrs.is_statx());
        assert_eq!(attrs.file_type(), FileType::Regular);
        assert_eq!(attrs.size(), 321);
        assert_eq!(attrs.birth_time(), None);
        assert_eq!(attrs.creation_time(), attrs.last_modified_time());
    }

    #[test]
    fn test_legacy_nofollow() {
        let dir = TempDir::new().unwrap();
        let target = create_test_file(dir.path(), "t", 10);
        let link = dir.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let legacy = ExtendedStat::new(None);
        let own = FileAttributes::get_with(&legacy, &link, false).unwrap();
        assert_eq!(own.file_type(), FileType::Symlink);
        let followed = FileAttributes::get_with(&legacy, &link, true).unwrap();
        assert_eq!(followed.file_type(), FileType::Regular);
        assert_eq!(followed.size(), 10);
    }

    #[test]
    fn test_statx_and_legacy_agree() {
        if !capability_flags().extended_stat {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "b.bin", 2048);

        let modern = FileAttributes::get(&path, true).unwrap();
        let legacy = FileAttributes::get_with(&ExtendedStat::new(None), &path, true).unwrap();
        assert!(modern.is_statx());

        let (m, l) = (modern.metadata(), legacy.metadata());
        assert_eq!(m.mode, l.mode);
        assert_eq!(m.ino, l.ino);
        assert_eq!(m.dev, l.dev);
        assert_eq!(m.rdev, l.rdev);
        assert_eq!(m.nlink, l.nlink);
        assert_eq!(m.uid, l.uid);
        assert_eq!(m.gid, l.gid);
        assert_eq!(m.size, l.size);
        assert_eq!(m.mtime, l.mtime);
        assert_eq!(m.ctime, l.ctime);
    }

    #[test]
    fn test_from_fd_both_paths() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "c.bin", 64);
        let file = File::open(&path).unwrap();

        let legacy = FileAttributes::from_fd_with(&ExtendedStat::new(None), &file).unwrap();
        let any = FileAttributes::from_fd(&file).unwrap();
        assert_eq!(legacy.file_key(), any.file_key());
        assert_eq!(legacy.size(), 64);
    }

    #[test]
    fn test_missing_file_error() {
        let err = FileAttributes::get(Path::new("/nonexistent/fsdispatch"), true).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_directory_type_and_permissions() {
        let dir = TempDir::new().unwrap();
        let attrs = FileAttributes::get(dir.path(), true).unwrap();
        assert_eq!(attrs.file_type(), FileType::Directory);
        assert_eq!(attrs.permissions() & 0o700, 0o700);
    }
}
