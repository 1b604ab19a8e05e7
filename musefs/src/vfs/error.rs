//! Error surface of the read-only VFS.
//!
//! Lookup misses are ordinary values (`NotFound`), physical I/O failures keep
//! the original `std::io::Error` so the errno reaches the requester unchanged.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct PathHint(Option<String>);

impl PathHint {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(path: impl Into<String>) -> Self {
        Self(Some(path.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for PathHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(path) if !path.is_empty() => write!(f, ": {path}"),
            _ => Ok(()),
        }
    }
}

impl From<String> for PathHint {
    fn from(value: String) -> Self {
        Self::some(value)
    }
}

impl From<&str> for PathHint {
    fn from(value: &str) -> Self {
        Self::some(value)
    }
}

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("not found{path}")]
    NotFound { path: PathHint },

    #[error("not a directory{path}")]
    NotADirectory { path: PathHint },

    #[error("is a directory{path}")]
    IsADirectory { path: PathHint },

    /// A path segment already exists as a file where a directory is needed.
    #[error("can't replace file with directory{path}")]
    StructuralConflict { path: PathHint },

    #[error("unknown file handle {0}")]
    HandleNotFound(u64),

    #[error("permission denied{path}")]
    AccessDenied { path: PathHint },

    #[error("read-only filesystem{path}")]
    ReadOnlyFilesystem { path: PathHint },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("blocking I/O task failed")]
    TaskJoin,
}

impl VfsError {
    pub fn not_found(path: impl Into<PathHint>) -> Self {
        VfsError::NotFound { path: path.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }

    /// errno reported to the protocol host for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound { .. } => libc::ENOENT,
            VfsError::NotADirectory { .. } => libc::ENOTDIR,
            VfsError::IsADirectory { .. } => libc::EISDIR,
            VfsError::StructuralConflict { .. } => libc::EEXIST,
            VfsError::HandleNotFound(_) => libc::EBADF,
            VfsError::AccessDenied { .. } => libc::EACCES,
            VfsError::ReadOnlyFilesystem { .. } => libc::EROFS,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            VfsError::TaskJoin => libc::EIO,
        }
    }
}

impl From<tokio::task::JoinError> for VfsError {
    fn from(_: tokio::task::JoinError) -> Self {
        VfsError::TaskJoin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_display_with_and_without_path() {
        assert_eq!(VfsError::not_found("artist/Nobody").to_string(), "not found: artist/Nobody");
        assert_eq!(
            VfsError::NotFound {
                path: PathHint::none()
            }
            .to_string(),
            "not found"
        );
        assert_eq!(VfsError::HandleNotFound(7).to_string(), "unknown file handle 7");
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VfsError::not_found("x").errno(), libc::ENOENT);
        assert_eq!(
            VfsError::AccessDenied { path: "x".into() }.errno(),
            libc::EACCES
        );
        assert_eq!(
            VfsError::ReadOnlyFilesystem { path: "x".into() }.errno(),
            libc::EROFS
        );
        assert_eq!(VfsError::HandleNotFound(3).errno(), libc::EBADF);
        assert_eq!(
            VfsError::StructuralConflict { path: "x".into() }.errno(),
            libc::EEXIST
        );
    }

    #[test]
    fn test_io_errno_is_preserved() {
        let err = VfsError::from(io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.errno(), libc::EACCES);
        let other = VfsError::from(io::Error::other("boom"));
        assert_eq!(other.errno(), libc::EIO);
    }
}
