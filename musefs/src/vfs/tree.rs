//! Inode-addressed node graph.
//!
//! Nodes live in an arena indexed by `ino - 1`; the root directory is inode 1
//! and every later node takes the next number. Parents are referenced by inode
//! number, so the only owning edges run from the arena to its nodes and from
//! file nodes to their shared `CatalogEntry`.
//!
//! The graph is mutated only while the view indexer builds it. After that it
//! is published behind an `Arc` and read without locking.

use crate::catalog::CatalogEntry;
use crate::vfs::error::VfsError;
use crate::vfs::name::{sanitize, versioned};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

pub type Ino = u64;

pub const ROOT_INO: Ino = 1;

const FILE_PERM: u16 = 0o600;
const DIR_PERM: u16 = 0o700;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: Ino,
    pub kind: FileType,
}

#[derive(Clone, Debug)]
pub struct FileAttr {
    pub ino: Ino,
    pub kind: FileType,
    pub size: u64,
    pub mtime: SystemTime,
    pub perm: u16,
    pub nlink: u32,
}

#[derive(Debug)]
pub struct DirNode {
    pub ino: Ino,
    pub name: String,
    pub parent: Option<Ino>,
    entries: Vec<DirEntry>,
    index: HashMap<String, Ino>,
}

impl DirNode {
    fn new(ino: Ino, name: String, parent: Option<Ino>) -> Self {
        Self {
            ino,
            name,
            parent,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Children in insertion order.
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn child(&self, name: &str) -> Option<Ino> {
        self.index.get(name).copied()
    }

    fn push(&mut self, entry: DirEntry) {
        self.index.insert(entry.name.clone(), entry.ino);
        self.entries.push(entry);
    }
}

#[derive(Debug)]
pub struct FileNode {
    pub ino: Ino,
    pub name: String,
    pub parent: Ino,
    pub entry: Arc<CatalogEntry>,
}

#[derive(Debug)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    pub fn ino(&self) -> Ino {
        match self {
            Node::Dir(d) => d.ino,
            Node::File(f) => f.ino,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Dir(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn parent(&self) -> Option<Ino> {
        match self {
            Node::Dir(d) => d.parent,
            Node::File(f) => Some(f.parent),
        }
    }

    pub fn kind(&self) -> FileType {
        match self {
            Node::Dir(_) => FileType::Dir,
            Node::File(_) => FileType::File,
        }
    }
}

#[derive(Debug)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    next_ino: Ino,
    entries: Vec<Arc<CatalogEntry>>,
    built_at: SystemTime,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Dir(DirNode::new(ROOT_INO, String::new(), None))],
            next_ino: ROOT_INO + 1,
            entries: Vec::new(),
            built_at: SystemTime::now(),
        }
    }

    pub fn get(&self, ino: Ino) -> Option<&Node> {
        let idx = usize::try_from(ino.checked_sub(1)?).ok()?;
        self.nodes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        false
    }

    /// Every catalog entry handed to the indexer, including those that ended
    /// up with no virtual path.
    pub fn catalog(&self) -> &[Arc<CatalogEntry>] {
        &self.entries
    }

    fn node(&self, ino: Ino) -> Result<&Node, VfsError> {
        self.get(ino)
            .ok_or_else(|| VfsError::not_found(format!("inode {ino}")))
    }

    fn dir(&self, ino: Ino) -> Result<&DirNode, VfsError> {
        match self.node(ino)? {
            Node::Dir(d) => Ok(d),
            Node::File(f) => Err(VfsError::NotADirectory {
                path: f.name.as_str().into(),
            }),
        }
    }

    pub fn attr(&self, ino: Ino) -> Result<FileAttr, VfsError> {
        Ok(match self.node(ino)? {
            Node::Dir(d) => FileAttr {
                ino: d.ino,
                kind: FileType::Dir,
                size: 0,
                mtime: self.built_at,
                perm: DIR_PERM,
                nlink: 2,
            },
            Node::File(f) => FileAttr {
                ino: f.ino,
                kind: FileType::File,
                size: f.entry.file.size,
                mtime: f.entry.file.mod_time,
                perm: FILE_PERM,
                nlink: 1,
            },
        })
    }

    /// Resolve `name` inside directory `parent`.
    pub fn lookup(&self, parent: Ino, name: &str) -> Result<&Node, VfsError> {
        let dir = self.dir(parent)?;
        let ino = dir
            .child(name)
            .ok_or_else(|| VfsError::not_found(name))?;
        self.node(ino)
    }

    pub fn readdir(&self, ino: Ino) -> Result<&[DirEntry], VfsError> {
        Ok(self.dir(ino)?.entries())
    }

    pub fn parent_of(&self, ino: Ino) -> Option<Ino> {
        self.get(ino)?.parent()
    }

    /// Walk a slash-delimited virtual path from the root. Empty segments are
    /// ignored, so `""`, `"/"` and `"//"` all name the root.
    pub fn lookup_path(&self, path: &str) -> Result<&Node, VfsError> {
        let mut node = self.node(ROOT_INO)?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match node {
                Node::Dir(d) => {
                    let ino = d.child(part).ok_or_else(|| VfsError::not_found(path))?;
                    node = self.node(ino)?;
                }
                Node::File(_) => return Err(VfsError::not_found(path)),
            }
        }
        Ok(node)
    }

    /// Rebuild the virtual path of `ino` by following parent links.
    pub fn path_of(&self, ino: Ino) -> Option<String> {
        let mut parts = Vec::new();
        let mut cur = self.get(ino)?;
        while let Some(parent) = cur.parent() {
            parts.push(cur.name());
            cur = self.get(parent)?;
        }
        parts.reverse();
        Some(format!("/{}", parts.join("/")))
    }

    pub(crate) fn adopt(&mut self, entry: Arc<CatalogEntry>) {
        self.entries.push(entry);
    }

    fn alloc_ino(&mut self) -> Ino {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    fn dir_mut(&mut self, ino: Ino) -> &mut DirNode {
        match &mut self.nodes[(ino - 1) as usize] {
            Node::Dir(d) => d,
            Node::File(_) => unreachable!("inode {ino} was checked to be a directory"),
        }
    }

    /// mkdir -p: walk `segments` from the root, creating missing directories.
    /// Every segment is sanitised first.
    pub(crate) fn mkdir_p<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<Ino, VfsError> {
        let mut cur = ROOT_INO;
        for raw in segments {
            let part = sanitize(raw.as_ref());
            let existing = self.dir_mut(cur).child(&part);
            cur = match existing {
                Some(ino) => match self.node(ino)? {
                    Node::Dir(_) => ino,
                    Node::File(_) => {
                        let mut path = self.path_of(cur).unwrap_or_default();
                        if !path.ends_with('/') {
                            path.push('/');
                        }
                        path.push_str(&part);
                        return Err(VfsError::StructuralConflict { path: path.into() });
                    }
                },
                None => {
                    let ino = self.alloc_ino();
                    self.nodes.push(Node::Dir(DirNode::new(ino, part.clone(), Some(cur))));
                    self.dir_mut(cur).push(DirEntry {
                        name: part,
                        ino,
                        kind: FileType::Dir,
                    });
                    ino
                }
            };
        }
        Ok(cur)
    }

    /// Add a file node for `entry` to directory `dir`, named
    /// `sanitize(title) + ext`. A taken name gets `" v2"`, `" v3"`, ... before
    /// the extension.
    pub(crate) fn create_file(
        &mut self,
        dir: Ino,
        title: &str,
        ext: &str,
        entry: &Arc<CatalogEntry>,
    ) -> Ino {
        let title = sanitize(title);
        let ext = sanitize(ext);
        let mut n = 1;
        let name = loop {
            let candidate = versioned(&title, n, &ext);
            if self.dir_mut(dir).child(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        let ino = self.alloc_ino();
        self.nodes.push(Node::File(FileNode {
            ino,
            name: name.clone(),
            parent: dir,
            entry: Arc::clone(entry),
        }));
        self.dir_mut(dir).push(DirEntry {
            name,
            ino,
            kind: FileType::File,
        });
        ino
    }
}
