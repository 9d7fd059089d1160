//! Disk space probe
//!
//! Thin safe wrapper over `statvfs(2)`. Free space is what an unprivileged
//! process can actually use (`f_bavail`), matching what the upload agent
//! can consume.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Usage snapshot of the filesystem holding a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    /// Used fraction of total capacity, 0.0..=1.0.
    pub used_fraction: f64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Used space as a percentage.
    pub fn used_percent(&self) -> f64 {
        self.used_fraction * 100.0
    }
}

/// Probes the filesystem containing `path`.
pub fn disk_usage(path: &Path) -> io::Result<DiskUsage> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let frag = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * frag;
    let used = (stat.f_blocks as u64 - stat.f_bfree as u64) * frag;
    let free = stat.f_bavail as u64 * frag;

    let used_fraction = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    };

    Ok(DiskUsage {
        used_fraction,
        used_bytes: used,
        free_bytes: free,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_of_root_is_sane() {
        let usage = disk_usage(Path::new("/")).expect("statvfs /");
        assert!(usage.used_fraction >= 0.0 && usage.used_fraction <= 1.0);
        assert!(usage.used_bytes > 0);
        assert_eq!(usage.used_percent(), usage.used_fraction * 100.0);
    }

    #[test]
    fn probe_of_missing_path_fails() {
        assert!(disk_usage(Path::new("/definitely/not/here")).is_err());
    }
}
