//! Mount table reader
//!
//! Thin wrapper over the C library's `setmntent`/`getmntent_r`/`endmntent`.
//! Entries are returned as raw bytes: mount sources and directories are not
//! guaranteed to be valid UTF-8 and decoding them is the caller's business.

use crate::config::MountConfig;
use crate::error::{ErrnoResultExt, FsDispatchError, Result};
use crate::fs::retry::restartable;
use libc::{c_char, c_int};
use nix::errno::Errno;
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Default scratch buffer for one mount-table line
pub const DEFAULT_LINE_BUFFER: usize = 4096;

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device or source
    pub fsname: Vec<u8>,
    /// Mount point
    pub dir: Vec<u8>,
    /// Filesystem type
    pub fstype: Vec<u8>,
    /// Comma-separated mount options
    pub opts: Vec<u8>,
    /// Dump frequency column
    pub freq: i32,
    /// fsck pass number column
    pub passno: i32,
}

impl MountEntry {
    /// Mount point as a path
    pub fn dir_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.dir))
    }

    /// Filesystem type, lossily decoded
    pub fn fstype_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.fstype)
    }

    /// Source, lossily decoded
    pub fn fsname_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.fsname)
    }

    fn options(&self) -> impl Iterator<Item = &[u8]> {
        self.opts.split(|&b| b == b',')
    }

    /// Whether `name` is present, bare or as `name=value`
    pub fn has_option(&self, name: &str) -> bool {
        self.option_value(name).is_some()
    }

    /// Value of `name=value`; a bare `name` yields an empty value
    pub fn option_value(&self, name: &str) -> Option<&[u8]> {
        let name = name.as_bytes();
        self.options().find_map(|opt| {
            let rest = opt.strip_prefix(name)?;
            if rest.is_empty() {
                Some(rest)
            } else {
                rest.strip_prefix(b"=")
            }
        })
    }
}

/// An open mount table stream
///
/// The stream is closed when the table is dropped.
pub struct MountTable {
    stream: NonNull<libc::FILE>,
    buffer: Vec<u8>,
    path: PathBuf,
}

impl MountTable {
    /// Open a mount table file (`mode` as for `fopen`, usually `"r"`)
    pub fn open(path: &Path, mode: &str) -> Result<Self> {
        Self::open_with_buffer(path, mode, DEFAULT_LINE_BUFFER)
    }

    /// Open with an explicit per-line scratch buffer size
    pub fn open_with_buffer(path: &Path, mode: &str, buffer_size: usize) -> Result<Self> {
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| FsDispatchError::path(path, Errno::EINVAL))?;
        let cmode = CString::new(mode).map_err(|_| FsDispatchError::path(path, Errno::EINVAL))?;

        let stream = restartable(|| {
            // SAFETY: both strings are NUL-terminated and live across the call.
            let fp = unsafe { libc::setmntent(cpath.as_ptr(), cmode.as_ptr()) };
            NonNull::new(fp).ok_or_else(Errno::last)
        })
        .with_path(path)?;

        tracing::trace!(path = %path.display(), "opened mount table");
        Ok(Self {
            stream,
            buffer: vec![0u8; buffer_size.clamp(256, c_int::MAX as usize)],
            path: path.to_path_buf(),
        })
    }

    /// Open the table named in the configuration
    pub fn from_config(config: &MountConfig) -> Result<Self> {
        Self::open_with_buffer(&config.table_path, "r", config.line_buffer_size)
    }

    /// Open the kernel's view of the current mounts
    pub fn system() -> Result<Self> {
        Self::from_config(&MountConfig::default())
    }

    /// Path this table was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the next entry; `None` at end of table
    pub fn next_entry(&mut self) -> Option<MountEntry> {
        // SAFETY: all-zero is a valid mntent (null pointers, zero ints).
        let mut ent: libc::mntent = unsafe { std::mem::zeroed() };
        // SAFETY: the stream is open, `ent` and `buffer` are writable and the
        // length passed matches the buffer.
        let m = unsafe {
            libc::getmntent_r(
                self.stream.as_ptr(),
                &mut ent,
                self.buffer.as_mut_ptr() as *mut c_char,
                self.buffer.len() as c_int,
            )
        };
        if m.is_null() {
            return None;
        }

        // SAFETY: on success every string field points at a NUL-terminated
        // string inside `buffer`; copy them out before the next call reuses it.
        let copy = |p: *const c_char| unsafe { CStr::from_ptr(p) }.to_bytes().to_vec();
        Some(MountEntry {
            fsname: copy(ent.mnt_fsname),
            dir: copy(ent.mnt_dir),
            fstype: copy(ent.mnt_type),
            opts: copy(ent.mnt_opts),
            freq: ent.mnt_freq,
            passno: ent.mnt_passno,
        })
    }

    /// Close the stream
    pub fn close(self) {}
}

impl Iterator for MountTable {
    type Item = MountEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}

impl Drop for MountTable {
    fn drop(&mut self) {
        // endmntent always returns 1.
        // SAFETY: the stream came from setmntent and is closed exactly once.
        unsafe {
            libc::endmntent(self.stream.as_ptr());
        }
    }
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("path", &self.path)
            .field("buffer_size", &self.buffer.len())
            .finish()
    }
}

/// Read every entry of a mount table
pub fn read_mount_table(path: &Path) -> Result<Vec<MountEntry>> {
    Ok(MountTable::open(path, "r")?.collect())
}

/// The entry whose mount point is the longest prefix of `path`.
///
/// Among equally long mount points the last one wins, as later mounts hide
/// earlier ones.
pub fn find_mount<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    let mut best: Option<&MountEntry> = None;
    for entry in entries {
        let dir = entry.dir_path();
        if !path.starts_with(dir) {
            continue;
        }
        let longer = best.map_or(true, |b| {
            dir.as_os_str().len() >= b.dir_path().as_os_str().len()
        });
        if longer {
            best = Some(entry);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TABLE: &str = "\
/dev/nvme0n1p2 / ext4 rw,relatime,errors=remount-ro 0 1
proc /proc proc rw,nosuid,nodev,noexec 0 0
tmpfs /run tmpfs rw,nosuid,size=1635856k,mode=755 0 0
/dev/nvme0n1p1 /boot/efi vfat rw,umask=0077 0 2
";

    fn write_table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_iterates_every_line_then_ends() {
        let file = write_table(TABLE);
        let mut table = MountTable::open(file.path(), "r").unwrap();

        let mut seen = Vec::new();
        while let Some(entry) = table.next_entry() {
            seen.push(entry);
        }
        assert_eq!(seen.len(), 4);
        assert!(table.next_entry().is_none());

        for (entry, line) in seen.iter().zip(TABLE.lines()) {
            let cols: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(entry.fsname, cols[0].as_bytes());
            assert_eq!(entry.dir, cols[1].as_bytes());
            assert_eq!(entry.fstype, cols[2].as_bytes());
            assert_eq!(entry.opts, cols[3].as_bytes());
        }
        assert_eq!(seen[3].passno, 2);
    }

    #[test]
    fn test_empty_table() {
        let file = write_table("");
        let table = MountTable::open(file.path(), "r").unwrap();
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_open_missing_reports_errno() {
        let err = MountTable::open(Path::new("/nonexistent/mtab"), "r").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_options() {
        let file = write_table(TABLE);
        let entries = read_mount_table(file.path()).unwrap();
        let run = &entries[2];
        assert!(run.has_option("nosuid"));
        assert!(!run.has_option("nosu"));
        assert_eq!(run.option_value("mode"), Some(&b"755"[..]));
        assert_eq!(run.option_value("rw"), Some(&b""[..]));
        assert_eq!(run.option_value("noexec"), None);
        assert_eq!(run.fstype_lossy(), "tmpfs");
    }

    #[test]
    fn test_find_mount() {
        let file = write_table(TABLE);
        let entries = read_mount_table(file.path()).unwrap();

        let m = find_mount(&entries, Path::new("/boot/efi/EFI/boot")).unwrap();
        assert_eq!(m.fsname_lossy(), "/dev/nvme0n1p1");
        let m = find_mount(&entries, Path::new("/home/user")).unwrap();
        assert_eq!(m.dir_path(), Path::new("/"));
        let m = find_mount(&entries, Path::new("/running")).unwrap();
        assert_eq!(m.dir_path(), Path::new("/"));
    }

    #[test]
    fn test_system_table() {
        let config = MountConfig::default();
        if !config.table_path.exists() {
            return;
        }
        let entries: Vec<_> = MountTable::system().unwrap().collect();
        assert!(!entries.is_empty());
        assert!(find_mount(&entries, Path::new("/")).is_some());
    }
}
