use std::time::Duration;

/// The tree never changes after indexing, so the kernel may hold on to
/// entries and attributes for a long time.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_FS_NAME: &str = "musefs";

#[derive(Clone, Debug)]
pub struct VfsConfig {
    pub entry_ttl: Duration,
    pub attr_ttl: Duration,
    /// Source name shown in the mount table.
    pub fs_name: String,
    /// Let other users see the mount. Requires `user_allow_other` in
    /// /etc/fuse.conf for non-root mounts.
    pub allow_other: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            entry_ttl: DEFAULT_TTL,
            attr_ttl: DEFAULT_TTL,
            fs_name: DEFAULT_FS_NAME.to_string(),
            allow_other: false,
        }
    }
}

impl VfsConfig {
    pub fn entry_ttl(self, entry_ttl: Duration) -> Self {
        Self { entry_ttl, ..self }
    }

    pub fn attr_ttl(self, attr_ttl: Duration) -> Self {
        Self { attr_ttl, ..self }
    }

    pub fn fs_name(self, fs_name: impl Into<String>) -> Self {
        Self {
            fs_name: fs_name.into(),
            ..self
        }
    }

    pub fn allow_other(self, allow_other: bool) -> Self {
        Self {
            allow_other,
            ..self
        }
    }
}
