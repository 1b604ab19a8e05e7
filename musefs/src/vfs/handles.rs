//! Open-file handle table.
//!
//! The table is the only state that changes while the filesystem is mounted.
//! Its mutex guards id bookkeeping only; opening, stat-ing and reading the
//! physical file all happen outside the lock on the blocking pool.

use crate::catalog::CatalogEntry;
use crate::vfs::error::VfsError;
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// One open physical file.
#[derive(Debug)]
pub struct Handle {
    pub id: u64,
    file: File,
    /// Size at open time. Reads are clipped to this even if the file grows.
    pub size: u64,
}

impl Handle {
    /// Positional read clipped to the size snapshot. No cursor is shared, so
    /// concurrent calls on one handle do not interfere.
    pub fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        if offset >= self.size {
            return Ok(Vec::new());
        }
        let len = (len as u64).min(self.size - offset) as usize;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

#[derive(Debug)]
struct Slots {
    /// Last id handed out; the next allocation starts scanning here.
    cursor: u64,
    open: HashMap<u64, Arc<Handle>>,
}

impl Slots {
    /// Lowest free id at or after the cursor, wrapping and skipping 0.
    fn next_free(&mut self) -> u64 {
        let mut id = self.cursor;
        while id == 0 || self.open.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.cursor = id;
        id
    }
}

#[derive(Debug)]
pub struct HandleTable {
    slots: Mutex<Slots>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                cursor: 1,
                open: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Bookkeeping stays consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the physical file behind `entry` and register a handle for it.
    pub async fn open(&self, entry: &CatalogEntry) -> Result<Arc<Handle>, VfsError> {
        let path = entry.file.full_path();
        let (file, size) = tokio::task::spawn_blocking(move || -> std::io::Result<(File, u64)> {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        })
        .await??;

        let handle = {
            let mut slots = self.lock();
            let id = slots.next_free();
            let handle = Arc::new(Handle { id, file, size });
            slots.open.insert(id, Arc::clone(&handle));
            handle
        };
        debug!(fh = handle.id, size, "handle opened");
        Ok(handle)
    }

    pub fn get(&self, id: u64) -> Result<Arc<Handle>, VfsError> {
        self.lock()
            .open
            .get(&id)
            .cloned()
            .ok_or(VfsError::HandleNotFound(id))
    }

    pub async fn read(&self, id: u64, offset: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        let handle = self.get(id)?;
        let data = tokio::task::spawn_blocking(move || handle.read_at(offset, len)).await??;
        trace!(fh = id, offset, len, got = data.len(), "read");
        Ok(data)
    }

    /// Drop the handle. The descriptor closes once in-flight reads that still
    /// hold it complete.
    pub fn release(&self, id: u64) -> Result<(), VfsError> {
        let removed = self.lock().open.remove(&id);
        match removed {
            Some(_) => {
                debug!(fh = id, "handle released");
                Ok(())
            }
            None => Err(VfsError::HandleNotFound(id)),
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, FileKind, FileRecord};
    use std::collections::HashSet;
    use std::time::SystemTime;

    fn entry_for(dir: &std::path::Path, name: &str, data: &[u8]) -> CatalogEntry {
        std::fs::write(dir.join(name), data).unwrap();
        CatalogEntry::new(
            FileRecord {
                prefix: dir.to_path_buf(),
                path: name.into(),
                size: data.len() as u64,
                mod_time: SystemTime::now(),
                kind: FileKind::Audio,
            },
            Ok(None),
        )
    }

    #[tokio::test]
    async fn test_read_clips_to_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = entry_for(tmp.path(), "a.mp3", b"0123456789");
        let table = HandleTable::new();
        let h = table.open(&entry).await.unwrap();
        assert_eq!(h.size, 10);

        assert_eq!(table.read(h.id, 0, 4).await.unwrap(), b"0123");
        assert_eq!(table.read(h.id, 6, 100).await.unwrap(), b"6789");
        assert!(table.read(h.id, 10, 4).await.unwrap().is_empty());
        assert!(table.read(h.id, 50, 4).await.unwrap().is_empty());

        // Growth after open is not visible.
        std::fs::write(tmp.path().join("a.mp3"), b"0123456789abcdef").unwrap();
        assert_eq!(table.read(h.id, 8, 100).await.unwrap(), b"89");
    }

    #[tokio::test]
    async fn test_open_missing_file_surfaces_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = entry_for(tmp.path(), "a.mp3", b"x");
        std::fs::remove_file(tmp.path().join("a.mp3")).unwrap();
        let table = HandleTable::new();
        let err = table.open(&entry).await.unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_release_and_reuse() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = entry_for(tmp.path(), "a.mp3", b"abc");
        let table = HandleTable::new();

        let a = table.open(&entry).await.unwrap();
        let b = table.open(&entry).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        table.release(b.id).unwrap();
        assert!(matches!(
            table.release(b.id),
            Err(VfsError::HandleNotFound(2))
        ));
        assert!(matches!(
            table.read(b.id, 0, 1).await,
            Err(VfsError::HandleNotFound(2))
        ));

        let c = table.open(&entry).await.unwrap();
        assert_eq!(c.id, 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_allocation_wraps_and_skips_zero() {
        let mut slots = Slots {
            cursor: u64::MAX,
            open: HashMap::new(),
        };
        assert_eq!(slots.next_free(), u64::MAX);
        slots.open.insert(u64::MAX, dummy(u64::MAX));
        slots.open.insert(1, dummy(1));
        assert_eq!(slots.next_free(), 2);
    }

    fn dummy(id: u64) -> Arc<Handle> {
        let file = tempfile::tempfile().unwrap();
        Arc::new(Handle { id, file, size: 0 })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opens_get_distinct_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = Arc::new(entry_for(tmp.path(), "a.mp3", b"abc"));
        let table = Arc::new(HandleTable::new());

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let table = Arc::clone(&table);
                let entry = Arc::clone(&entry);
                tokio::spawn(async move { table.open(&entry).await.unwrap().id })
            })
            .collect();

        let mut ids = HashSet::new();
        for t in tasks {
            assert!(ids.insert(t.await.unwrap()));
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(table.len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_reads_on_one_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let entry = entry_for(tmp.path(), "big.flac", &data);
        let table = Arc::new(HandleTable::new());
        let id = table.open(&entry).await.unwrap().id;

        let tasks: Vec<_> = (0..16u64)
            .map(|i| {
                let table = Arc::clone(&table);
                tokio::spawn(async move { (i, table.read(id, i * 4096, 4096).await.unwrap()) })
            })
            .collect();
        for t in tasks {
            let (i, got) = t.await.unwrap();
            let start = (i * 4096) as usize;
            assert_eq!(got, &data[start..start + 4096]);
        }
    }
}
