//! FUSE adapter and request handling
//!
//! Implements rfuse3's `Filesystem` for `MuseFs`. Reads of the tree go
//! straight to the immutable node graph; open/read/release drive the handle
//! table. Every mutating request is answered with `EROFS`.
//!
//! - `mount`: mount option defaults and the unprivileged mount helper.
pub mod mount;

use crate::vfs::error::VfsError;
use crate::vfs::fs::{FileType as VfsFileType, MuseFs};
use crate::vfs::tree::FileAttr as VfsFileAttr;
use bytes::Bytes;
use rfuse3::Errno;
use rfuse3::Result as FuseResult;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyCreated, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;

use futures_util::stream::{self, Stream};
use rfuse3::raw::Filesystem;
use rfuse3::{FileType as FuseFileType, SetAttr, Timestamp};
use tracing::{debug, info, warn};

/// FOPEN_KEEP_CACHE: file content is immutable for the whole mount.
const FOPEN_KEEP_CACHE: u32 = 1 << 1;

const MAX_WRITE: u32 = 128 * 1024;

impl From<VfsError> for Errno {
    fn from(err: VfsError) -> Self {
        Errno::from(err.errno())
    }
}

fn read_only() -> Errno {
    libc::EROFS.into()
}

#[cfg(all(test, target_os = "linux"))]
mod mount_tests {
    use super::*;
    use crate::catalog::{CatalogEntry, FileKind, FileRecord, Metadata};
    use crate::fuse::mount::mount_unprivileged;
    use crate::vfs::config::VfsConfig;
    use std::fs;
    use std::time::{Duration as StdDuration, SystemTime};

    // Mount smoke test; needs fusermount3, opt in with MUSEFS_FUSE_TEST=1.
    #[tokio::test]
    async fn smoke_mount_and_browse() {
        if std::env::var("MUSEFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set MUSEFS_FUSE_TEST=1 to enable");
            return;
        }

        let src = tempfile::tempdir().expect("tmp src");
        fs::write(src.path().join("words.mp3"), b"not really audio").expect("write src");
        let entry = CatalogEntry::new(
            FileRecord {
                prefix: src.path().to_path_buf(),
                path: "words.mp3".into(),
                size: 16,
                mod_time: SystemTime::now(),
                kind: FileKind::Audio,
            },
            Ok(Some(Metadata {
                artist: Some("Low".into()),
                title: Some("Words".into()),
                year: 1994,
                ..Default::default()
            })),
        );
        let config = VfsConfig::default();
        let (musefs, _) = MuseFs::from_entries(vec![entry], config.clone());

        let mnt = tempfile::tempdir().expect("tmp mount");
        let mnt_path = mnt.path().to_path_buf();
        let handle = match mount_unprivileged(musefs, &config, &mnt_path).await {
            Ok(h) => h,
            Err(e) => {
                eprintln!("skip fuse test: mount failed: {}", e);
                return;
            }
        };

        tokio::time::sleep(StdDuration::from_millis(2000)).await;

        let mut root = fs::read_dir(&mnt_path)
            .expect("readdir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        root.sort();
        assert_eq!(root, vec!["artist", "year"]);

        let file = mnt_path.join("artist/Low/Words.mp3");
        assert_eq!(fs::read(&file).expect("read back"), b"not really audio");
        assert!(fs::OpenOptions::new().write(true).open(&file).is_err());
        assert!(fs::create_dir(mnt_path.join("new")).is_err());

        if let Err(e) = handle.unmount().await {
            eprintln!("unmount error: {}", e);
        }
    }
}

impl Filesystem for MuseFs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!(nodes = self.graph().len(), "fuse session initialised");
        // Writes are always refused; the value only has to be valid.
        let max_write = NonZeroU32::new(MAX_WRITE).ok_or_else(|| Errno::from(libc::EINVAL))?;
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {
        info!(open_handles = self.handles().len(), "fuse session destroyed");
    }

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        // Stored names are UTF-8; anything else cannot match.
        let Some(name) = name.to_str() else {
            return Err(libc::ENOENT.into());
        };
        let child = self.child_of(parent, name)?;
        let vattr = self.stat_ino(child)?;
        let attr = vfs_to_fuse_attr(&vattr, req.uid, req.gid);
        Ok(ReplyEntry {
            ttl: self.config().entry_ttl,
            attr,
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let vattr = self.stat_ino(ino)?;
        Ok(ReplyAttr {
            ttl: self.config().attr_ttl,
            attr: vfs_to_fuse_attr(&vattr, req.uid, req.gid),
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let handle = MuseFs::open(self, ino, flags as i32).await.map_err(|e| {
            debug!(ino, flags, error = %e, "fuse.open refused");
            Errno::from(e)
        })?;
        debug!(ino, fh = handle.id, "fuse.open");
        Ok(ReplyOpen {
            fh: handle.id,
            flags: FOPEN_KEEP_CACHE,
        })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let attr = self.stat_ino(ino)?;
        if !matches!(attr.kind, VfsFileType::Dir) {
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let data = MuseFs::read(self, fh, offset, size as usize)
            .await
            .map_err(|e| {
                warn!(ino, fh, offset, size, error = %e, "fuse.read failed");
                Errno::from(e)
            })?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let rows = resume(listing(self, ino)?, offset);
        let slice = rows.into_iter().map(|row| DirectoryEntry {
            inode: row.ino,
            kind: vfs_kind_to_fuse(row.kind),
            name: row.name,
            offset: row.offset,
        });
        let stream_iter = stream::iter(slice.map(Ok));
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectory::<Self::DirEntryStream<'a>> { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let entry_ttl = self.config().entry_ttl;
        let attr_ttl = self.config().attr_ttl;

        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = resume(listing(self, ino)?, offset);
        let mut slice = Vec::with_capacity(rows.len());
        for row in rows {
            let vattr = self.stat_ino(row.ino)?;
            slice.push(DirectoryEntryPlus {
                inode: row.ino,
                generation: 0,
                kind: vfs_kind_to_fuse(row.kind),
                name: row.name,
                offset: row.offset,
                attr: vfs_to_fuse_attr(&vattr, req.uid, req.gid),
                entry_ttl,
                attr_ttl,
            });
        }
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let files = self.graph().len() as u64;
        let bytes: u64 = self
            .graph()
            .catalog()
            .iter()
            .map(|e| e.file.size)
            .sum();
        let bsize: u32 = 4096;
        Ok(ReplyStatFs {
            blocks: bytes.div_ceil(bsize as u64),
            bfree: 0,
            bavail: 0,
            files,
            ffree: 0,
            bsize,
            namelen: 255,
            frsize: bsize,
        })
    }

    async fn release(
        &self,
        _req: Request,
        inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        debug!(ino = inode, fh, "fuse.release");
        MuseFs::release(self, fh).map_err(|e| {
            warn!(ino = inode, fh, error = %e, "fuse.release of unknown handle");
            Errno::from(e)
        })
    }

    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    // Inodes live as long as the mount; nothing to reclaim.
    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    // ===== mutations: the tree is read-only =====
    async fn setattr(
        &self,
        _req: Request,
        _ino: u64,
        _fh: Option<u64>,
        _set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        Err(read_only())
    }

    async fn write(
        &self,
        _req: Request,
        _ino: u64,
        _fh: u64,
        _offset: u64,
        _data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        Err(read_only())
    }

    async fn mkdir(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
    ) -> FuseResult<ReplyEntry> {
        Err(read_only())
    }

    async fn create(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _flags: u32,
    ) -> FuseResult<ReplyCreated> {
        Err(read_only())
    }

    async fn unlink(&self, _req: Request, _parent: u64, _name: &OsStr) -> FuseResult<()> {
        Err(read_only())
    }

    async fn rmdir(&self, _req: Request, _parent: u64, _name: &OsStr) -> FuseResult<()> {
        Err(read_only())
    }

    async fn rename(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _new_parent: u64,
        _new_name: &OsStr,
    ) -> FuseResult<()> {
        Err(read_only())
    }
}

// =============== helpers ===============

/// One directory listing row. `offset` is the cookie the kernel hands back
/// to resume after this row.
struct Row {
    ino: u64,
    kind: VfsFileType,
    name: OsString,
    offset: i64,
}

/// "." and ".." take offsets 1 and 2; children follow from 3.
fn listing(fs: &MuseFs, ino: u64) -> Result<Vec<Row>, VfsError> {
    let entries = fs.readdir_ino(ino)?;
    let mut all = Vec::with_capacity(entries.len() + 2);
    all.push(Row {
        ino,
        kind: VfsFileType::Dir,
        name: OsString::from("."),
        offset: 1,
    });
    all.push(Row {
        ino: fs.parent_of(ino),
        kind: VfsFileType::Dir,
        name: OsString::from(".."),
        offset: 2,
    });
    for (i, e) in entries.iter().enumerate() {
        all.push(Row {
            ino: e.ino,
            kind: e.kind,
            name: OsString::from(e.name.clone()),
            offset: (i as i64) + 3,
        });
    }
    Ok(all)
}

/// Rows after the one whose cookie is `offset`. Zero or negative restarts
/// the listing.
fn resume<T>(mut all: Vec<T>, offset: i64) -> Vec<T> {
    let start = usize::try_from(offset).unwrap_or(0);
    if start >= all.len() {
        Vec::new()
    } else {
        all.split_off(start)
    }
}
fn vfs_kind_to_fuse(k: VfsFileType) -> FuseFileType {
    match k {
        VfsFileType::Dir => FuseFileType::Directory,
        VfsFileType::File => FuseFileType::RegularFile,
    }
}

fn vfs_to_fuse_attr(v: &VfsFileAttr, uid: u32, gid: u32) -> rfuse3::raw::reply::FileAttr {
    let mtime = Timestamp::from(v.mtime);
    // blocks are counted in 512B units
    let blocks = v.size.div_ceil(512);
    rfuse3::raw::reply::FileAttr {
        ino: v.ino,
        size: v.size,
        blocks,
        atime: mtime,
        mtime,
        ctime: mtime,
        #[cfg(target_os = "macos")]
        crtime: mtime,
        kind: vfs_kind_to_fuse(v.kind),
        perm: v.perm,
        nlink: v.nlink,
        uid,
        gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}
