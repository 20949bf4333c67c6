use thiserror::Error;

/// Errors returned to filesystem callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("No such file or directory")]
    NotFound,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Is a directory")]
    IsADirectory,

    /// Any attempt to modify the filesystem.
    #[error("Read-only file system")]
    ReadOnly,

    /// Fetching content from GitHub failed or timed out.
    #[error("Failed to fetch {resource}: {message}")]
    Io { resource: String, message: String },
}

impl FsError {
    pub fn io(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// The errno reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::ReadOnly => libc::EROFS,
            FsError::Io { .. } => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::NotADirectory.errno(), libc::ENOTDIR);
        assert_eq!(FsError::IsADirectory.errno(), libc::EISDIR);
        assert_eq!(FsError::ReadOnly.errno(), libc::EROFS);
        assert_eq!(FsError::io("alice/demo", "timed out").errno(), libc::EIO);
    }

    #[test]
    fn test_io_message() {
        let err = FsError::io("blob abc", "timed out");
        assert_eq!(err.to_string(), "Failed to fetch blob abc: timed out");
    }
}
