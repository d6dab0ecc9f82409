//! Runtime kernel capability detection
//!
//! Whether `statx` and `copy_file_range` can be used depends on the C library
//! the process is linked against at run time, not on the build host. Both
//! entry points are looked up by name in the loaded libraries once per
//! process. A missing symbol is not an error: the corresponding flag is
//! simply false and callers take their legacy path.

use crate::fs::copy::CopyFileRangeFn;
use crate::fs::statx::StatxFn;
use serde::Serialize;
use std::sync::OnceLock;

/// Kernel release that introduced `statx`
pub const STATX_MIN_KERNEL: (u32, u32, u32) = (4, 11, 0);

/// Kernel release that introduced `copy_file_range`
pub const COPY_FILE_RANGE_MIN_KERNEL: (u32, u32, u32) = (4, 5, 0);

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Which optional kernel facilities are usable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    /// `statx` resolved
    pub extended_stat: bool,
    /// `copy_file_range` resolved
    pub in_kernel_copy: bool,
}

/// Resolved optional entry points.
///
/// Each slot is the strategy the stat and copy paths dispatch on; `None`
/// means the legacy path.
#[derive(Clone, Copy, Default)]
pub struct Capabilities {
    statx: Option<StatxFn>,
    copy_file_range: Option<CopyFileRangeFn>,
}

impl Capabilities {
    /// Capabilities with nothing available
    pub const fn none() -> Self {
        Self {
            statx: None,
            copy_file_range: None,
        }
    }

    /// Build from explicit strategies
    pub const fn with_functions(
        statx: Option<StatxFn>,
        copy_file_range: Option<CopyFileRangeFn>,
    ) -> Self {
        Self {
            statx,
            copy_file_range,
        }
    }

    /// The two boolean flags
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags {
            extended_stat: self.statx.is_some(),
            in_kernel_copy: self.copy_file_range.is_some(),
        }
    }

    /// Resolved `statx`, if any
    pub fn statx(&self) -> Option<StatxFn> {
        self.statx
    }

    /// Resolved `copy_file_range`, if any
    pub fn copy_file_range(&self) -> Option<CopyFileRangeFn> {
        self.copy_file_range
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("statx", &self.statx.is_some())
            .field("copy_file_range", &self.copy_file_range.is_some())
            .finish()
    }
}

/// Look up `name` (NUL-terminated) in the already-loaded libraries
#[cfg(target_os = "linux")]
fn lookup_symbol(name: &'static [u8]) -> Option<*mut libc::c_void> {
    debug_assert_eq!(name.last(), Some(&0));
    // SAFETY: `name` is a static NUL-terminated string and RTLD_DEFAULT
    // searches the global symbol scope without loading anything new.
    let sym = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr() as *const libc::c_char) };
    if sym.is_null() {
        None
    } else {
        Some(sym)
    }
}

/// Probe the running process for optional kernel entry points.
///
/// This always performs the lookup; use [`capabilities`] for the cached,
/// process-wide result.
#[cfg(target_os = "linux")]
pub fn probe() -> Capabilities {
    // SAFETY: the glibc/musl symbols have exactly these C signatures.
    let statx = lookup_symbol(b"statx\0")
        .map(|sym| unsafe { std::mem::transmute::<*mut libc::c_void, StatxFn>(sym) });
    let copy_file_range = lookup_symbol(b"copy_file_range\0")
        .map(|sym| unsafe { std::mem::transmute::<*mut libc::c_void, CopyFileRangeFn>(sym) });

    let caps = Capabilities {
        statx,
        copy_file_range,
    };
    tracing::debug!(
        extended_stat = caps.statx.is_some(),
        in_kernel_copy = caps.copy_file_range.is_some(),
        "probed kernel capabilities"
    );
    caps
}

/// Probe the running process for optional kernel entry points
#[cfg(not(target_os = "linux"))]
pub fn probe() -> Capabilities {
    Capabilities::none()
}

/// Process-wide capabilities, probed on first use and never recomputed
pub fn capabilities() -> &'static Capabilities {
    CAPABILITIES.get_or_init(probe)
}

/// Shorthand for `capabilities().flags()`
pub fn capability_flags() -> CapabilityFlags {
    capabilities().flags()
}

/// Parsed kernel version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct KernelVersion {
    /// Major release
    pub major: u32,
    /// Minor release
    pub minor: u32,
    /// Patch level
    pub patch: u32,
}

impl KernelVersion {
    /// Parse kernel version from a uname release string
    pub fn parse(release: &str) -> Option<Self> {
        let mut parts = release.split(['.', '-', '+']);
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Version of the running kernel
    pub fn current() -> Option<Self> {
        let uts = nix::sys::utsname::uname().ok()?;
        Self::parse(&uts.release().to_string_lossy())
    }

    /// Check if this version meets minimum requirements
    pub fn meets_minimum(&self, min: (u32, u32, u32)) -> bool {
        (self.major, self.minor, self.patch) >= min
    }
}

impl std::fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_no_flags() {
        let caps = Capabilities::none();
        assert_eq!(caps.flags(), CapabilityFlags::default());
        assert!(caps.statx().is_none());
        assert!(caps.copy_file_range().is_none());
    }

    #[test]
    fn test_capabilities_are_stable() {
        let first = capability_flags();
        let second = capabilities().flags();
        assert_eq!(first, second);
        assert!(std::ptr::eq(capabilities(), capabilities()));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_probe_matches_cached() {
        let caps = probe();
        assert_eq!(caps.flags(), capability_flags());
    }

    #[test]
    fn test_kernel_version_parse() {
        let v = KernelVersion::parse("6.8.0-45-generic").unwrap();
        assert_eq!(v, KernelVersion { major: 6, minor: 8, patch: 0 });
        assert!(v.meets_minimum(STATX_MIN_KERNEL));

        let v = KernelVersion::parse("4.4").unwrap();
        assert_eq!(v.patch, 0);
        assert!(!v.meets_minimum(STATX_MIN_KERNEL));
        assert!(!v.meets_minimum(COPY_FILE_RANGE_MIN_KERNEL));

        assert!(KernelVersion::parse("garbage").is_none());
    }

    #[test]
    fn test_kernel_version_display() {
        let v = KernelVersion { major: 5, minor: 15, patch: 3 };
        assert_eq!(v.to_string(), "5.15.3");
    }
}
