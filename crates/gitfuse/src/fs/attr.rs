use chrono::{DateTime, Utc};

use crate::tree::NodeId;

/// Permission bits of every directory.
pub const DIR_PERM: u16 = 0o555;
/// Permission bits of every file.
pub const FILE_PERM: u16 = 0o444;
/// Block size reported in attributes.
pub const BLOCK_SIZE: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// The uid/gid every node is reported as owned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    /// The mounting process's uid and gid.
    pub fn current() -> Self {
        // SAFETY: getuid and getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }
}

/// Attributes of a node, derived only from catalog and listing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub id: NodeId,
    pub kind: NodeKind,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

impl Attributes {
    pub fn directory(id: NodeId, size: u64, mtime: DateTime<Utc>, owner: Ownership) -> Self {
        Self {
            id,
            kind: NodeKind::Directory,
            size,
            mtime,
            perm: DIR_PERM,
            nlink: 2,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    pub fn file(id: NodeId, size: u64, mtime: DateTime<Utc>, owner: Ownership) -> Self {
        Self {
            id,
            kind: NodeKind::File,
            size,
            mtime,
            perm: FILE_PERM,
            nlink: 1,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    /// Number of 512-byte blocks covering `size`.
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE as u64)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}
