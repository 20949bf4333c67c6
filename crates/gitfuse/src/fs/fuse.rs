//! Kernel binding through `fuser`.
//!
//! Every request is answered on the tokio runtime so that a slow lazy fetch
//! only holds up its own reply. All mutating requests fail with `EROFS`.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    BackgroundSession, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite,
    Request, TimeOrNow,
};
use tokio::runtime::Handle;

use super::adapter::GitHubFs;
use super::attr::{Attributes, BLOCK_SIZE, NodeKind};
use super::error::FsError;
use crate::tree::NodeId;

/// How long the kernel may cache entries and attributes.
const TTL: Duration = Duration::from_secs(1);

const MAX_NAME_LEN: u32 = 255;

pub const FS_NAME: &str = "gitfuse";

/// Options for [`mount`].
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountOptions {
    fn to_fuser(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RO,
            MountOption::FSName(FS_NAME.to_string()),
            MountOption::Subtype(FS_NAME.to_string()),
            MountOption::DefaultPermissions,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

fn file_attr(attr: &Attributes) -> FileAttr {
    let mtime = SystemTime::from(attr.mtime);
    FileAttr {
        ino: attr.id.as_u64(),
        size: attr.size,
        blocks: attr.blocks(),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// [`GitHubFs`] wired to the kernel.
pub struct FuseAdapter {
    fs: Arc<GitHubFs>,
    runtime: Handle,
}

impl FuseAdapter {
    pub fn new(fs: Arc<GitHubFs>, runtime: Handle) -> Self {
        Self { fs, runtime }
    }

    fn read_only(&self, operation: &str) -> i32 {
        self.fs.reject_mutation(operation).errno()
    }
}

impl Filesystem for FuseAdapter {
    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.fs.forget(NodeId(ino));
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_owned) else {
            reply.error(libc::ENOENT);
            return;
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            let result: Result<Attributes, FsError> = async {
                let node = fs.lookup(NodeId(parent), &name).await?;
                fs.getattr(node.id()).await
            }
            .await;
            match result {
                Ok(attr) => reply.entry(&TTL, &file_attr(&attr), 0),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            match fs.getattr(NodeId(ino)).await {
                Ok(attr) => reply.attr(&TTL, &file_attr(&attr)),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            match fs.open(NodeId(ino), flags).await {
                Ok(()) => reply.opened(0, 0),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            match fs.read(NodeId(ino), offset, size).await {
                Ok(bytes) => reply.data(&bytes),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            let id = NodeId(ino);
            let listing = async {
                let node = fs.node(id).await?;
                let entries = fs.readdir(id).await?;
                Ok::<_, FsError>((node, entries))
            }
            .await;

            let (node, entries) = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let mut all = Vec::with_capacity(entries.len() + 2);
            all.push((id, FileType::Directory, ".".to_string()));
            all.push((node.parent_id(), FileType::Directory, "..".to_string()));
            all.extend(
                entries
                    .into_iter()
                    .map(|e| (e.id(), file_type(e.kind()), e.name)),
            );

            let skip = usize::try_from(offset).unwrap_or(0);
            for (i, (child, kind, name)) in all.iter().enumerate().skip(skip) {
                // add() returns true once the reply buffer is full.
                if reply.add(child.as_u64(), (i + 1) as i64, *kind, name) {
                    break;
                }
            }
            reply.ok();
        });
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE, MAX_NAME_LEN, BLOCK_SIZE);
    }

    fn setattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(self.read_only("setattr"));
    }

    fn mknod(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.read_only("mknod"));
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.read_only("mkdir"));
    }

    fn unlink(&mut self, _req: &Request, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.read_only("unlink"));
    }

    fn rmdir(&mut self, _req: &Request, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.read_only("rmdir"));
    }

    fn symlink(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _link: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(self.read_only("symlink"));
    }

    fn rename(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.read_only("rename"));
    }

    fn link(
        &mut self,
        _req: &Request,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(self.read_only("link"));
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(self.read_only("write"));
    }

    fn create(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(self.read_only("create"));
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.read_only("setxattr"));
    }

    fn removexattr(&mut self, _req: &Request, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.read_only("removexattr"));
    }

    fn fallocate(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _length: i64,
        _mode: i32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.read_only("fallocate"));
    }
}

/// Mount `fs` read-only at `mount_point`.
///
/// The filesystem stays mounted until the returned session is dropped.
pub fn mount(
    fs: Arc<GitHubFs>,
    mount_point: &Path,
    options: &MountOptions,
    runtime: Handle,
) -> std::io::Result<BackgroundSession> {
    let adapter = FuseAdapter::new(fs, runtime);
    let session = fuser::spawn_mount2(adapter, mount_point, &options.to_fuser())?;
    tracing::info!(mount_point = %mount_point.display(), "Mounted filesystem");
    Ok(session)
}
