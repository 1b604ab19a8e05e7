//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Unix-like systems. On Linux we support unprivileged mount via fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use crate::vfs::config::VfsConfig;
use crate::vfs::fs::MuseFs;

/// Mount options for a read-only musefs session.
pub fn default_mount_options(config: &VfsConfig) -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name(config.fs_name.as_str())
        .read_only(true)
        .force_readdir_plus(true)
        .allow_other(config.allow_other);
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    mo.uid(uid).gid(gid);
    mo
}

/// Mount `fs` on an empty directory, via fusermount3 on Linux.
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged(
    fs: MuseFs,
    config: &VfsConfig,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let opts = default_mount_options(config);
    let session = rfuse3::raw::Session::new(opts);
    session.mount_with_unprivileged(fs, mount_point).await
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged(
    _fs: MuseFs,
    _config: &VfsConfig,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
