//! Read-only filesystem facade over a published `NodeGraph` and a
//! `HandleTable`. The FUSE adapter and the CLI browse commands both go
//! through this type.

use crate::catalog::CatalogEntry;
use crate::vfs::config::VfsConfig;
use crate::vfs::error::VfsError;
use crate::vfs::handles::{Handle, HandleTable};
use crate::vfs::index::{self, IndexReport};
use crate::vfs::tree::{DirEntry, FileAttr, Ino, Node, NodeGraph, ROOT_INO};
use std::sync::Arc;

pub use crate::vfs::tree::FileType;

pub struct MuseFs {
    graph: Arc<NodeGraph>,
    handles: HandleTable,
    config: VfsConfig,
}

impl MuseFs {
    /// Wrap an already built graph. From here on the graph is immutable.
    pub fn new(graph: NodeGraph, config: VfsConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            handles: HandleTable::new(),
            config,
        }
    }

    /// Index `entries` and publish the result.
    pub fn from_entries<I>(entries: I, config: VfsConfig) -> (Self, IndexReport)
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let (graph, report) = index::build(entries);
        (Self::new(graph, config), report)
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn root_ino(&self) -> Ino {
        ROOT_INO
    }

    pub fn stat_ino(&self, ino: Ino) -> Result<FileAttr, VfsError> {
        self.graph.attr(ino)
    }

    /// Child inode of `parent` named `name`.
    pub fn child_of(&self, parent: Ino, name: &str) -> Result<Ino, VfsError> {
        self.graph.lookup(parent, name).map(Node::ino)
    }

    pub fn readdir_ino(&self, ino: Ino) -> Result<&[DirEntry], VfsError> {
        self.graph.readdir(ino)
    }

    /// Parent inode; the root is its own parent.
    pub fn parent_of(&self, ino: Ino) -> Ino {
        self.graph.parent_of(ino).unwrap_or(ROOT_INO)
    }

    pub fn path_of(&self, ino: Ino) -> Option<String> {
        self.graph.path_of(ino)
    }

    pub fn lookup_path(&self, path: &str) -> Result<&Node, VfsError> {
        self.graph.lookup_path(path)
    }

    /// Open a file node for reading. Any open mode other than `O_RDONLY` is
    /// refused.
    pub async fn open(&self, ino: Ino, flags: i32) -> Result<Arc<Handle>, VfsError> {
        let file = match self.graph.get(ino) {
            Some(Node::File(f)) => f,
            Some(Node::Dir(d)) => {
                return Err(VfsError::IsADirectory {
                    path: d.name.as_str().into(),
                });
            }
            None => return Err(VfsError::not_found(format!("inode {ino}"))),
        };
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(VfsError::AccessDenied {
                path: file.name.as_str().into(),
            });
        }
        self.handles.open(&file.entry).await
    }

    pub async fn read(&self, fh: u64, offset: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        self.handles.read(fh, offset, len).await
    }

    pub fn release(&self, fh: u64) -> Result<(), VfsError> {
        self.handles.release(fh)
    }
}
