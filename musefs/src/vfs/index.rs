//! View indexer.
//!
//! A single sequential pass over the catalog that files every entry into the
//! views it qualifies for:
//!
//! - `failed/<base>.<n><ext>` when tag extraction failed
//! - `artist/<artist>/<title><ext>`
//! - `artist/<album artist>/<album>/<[DD-]TT title><ext>`
//! - `year/<year>/<artist>/<title><ext>`
//! - `genre/<genre>/<artist>/<title><ext>`
//! - `unsorted/<title or file name>.<n><ext>` when artist or title is missing
//!
//! Conflicts are scoped to one insertion: the entry keeps whatever other
//! views it was filed into and the pass carries on.

use crate::catalog::{CatalogEntry, FileKind};
use crate::vfs::error::VfsError;
use crate::vfs::name::{album_title, disambiguate};
use crate::vfs::tree::NodeGraph;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ARTIST_VIEW: &str = "artist";
pub const YEAR_VIEW: &str = "year";
pub const GENRE_VIEW: &str = "genre";
pub const UNSORTED_VIEW: &str = "unsorted";
pub const FAILED_VIEW: &str = "failed";

/// Counters collected over one indexing pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Entries filed under the tag-based views.
    pub indexed: usize,
    pub failed: usize,
    pub unsorted: usize,
    /// Playlists; they are cataloged but get no virtual path.
    pub skipped: usize,
    /// Virtual paths that could not be created.
    pub conflicts: Vec<String>,
}

pub struct ViewIndexer {
    graph: NodeGraph,
    report: IndexReport,
}

impl Default for ViewIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewIndexer {
    pub fn new() -> Self {
        Self {
            graph: NodeGraph::new(),
            report: IndexReport::default(),
        }
    }

    pub fn add(&mut self, entry: CatalogEntry) {
        let entry = Arc::new(entry);
        self.graph.adopt(Arc::clone(&entry));

        if entry.file.kind == FileKind::Playlist {
            self.report.skipped += 1;
            return;
        }

        let ext = entry.file.extension();
        if entry.is_failed() {
            self.report.failed += 1;
            let name = disambiguate(&entry.file.base_name());
            self.insert(&[FAILED_VIEW], &name, &ext, &entry);
            return;
        }

        let tagged = entry.metadata.as_ref().and_then(|m| {
            let artist = present(&m.artist)?;
            let title = present(&m.title)?;
            Some((m, artist, title))
        });

        let Some((meta, artist, title)) = tagged else {
            self.report.unsorted += 1;
            let title = entry
                .metadata
                .as_ref()
                .and_then(|m| present(&m.title))
                .map_or_else(|| entry.file.base_name(), str::to_string);
            self.insert(&[UNSORTED_VIEW], &disambiguate(&title), &ext, &entry);
            return;
        };

        self.report.indexed += 1;
        self.insert(&[ARTIST_VIEW, artist], title, &ext, &entry);

        if let Some(album) = present(&meta.album) {
            let album_artist = present(&meta.album_artist).unwrap_or(artist);
            let leaf = album_title(title, meta.track, meta.disc, meta.discs);
            self.insert(&[ARTIST_VIEW, album_artist, album], &leaf, &ext, &entry);
        }

        if meta.year > 0 {
            let year = meta.year.to_string();
            self.insert(&[YEAR_VIEW, year.as_str(), artist], title, &ext, &entry);
        }

        if let Some(genre) = present(&meta.genre) {
            self.insert(&[GENRE_VIEW, genre, artist], title, &ext, &entry);
        }
    }

    fn insert(&mut self, dirs: &[&str], title: &str, ext: &str, entry: &Arc<CatalogEntry>) {
        match self.graph.mkdir_p(dirs) {
            Ok(dir) => {
                let ino = self.graph.create_file(dir, title, ext, entry);
                debug!(ino, src = %entry.file.path.display(), "indexed");
            }
            Err(err) => {
                warn!(src = %entry.file.path.display(), error = %err, "skipping view");
                let path = match &err {
                    VfsError::StructuralConflict { path } => path.as_str().map(str::to_string),
                    _ => None,
                };
                self.report.conflicts.push(path.unwrap_or_else(|| err.to_string()));
            }
        }
    }

    pub fn finish(self) -> (NodeGraph, IndexReport) {
        let r = &self.report;
        info!(
            nodes = self.graph.len(),
            indexed = r.indexed,
            failed = r.failed,
            unsorted = r.unsorted,
            skipped = r.skipped,
            conflicts = r.conflicts.len(),
            "view index built"
        );
        (self.graph, self.report)
    }
}

/// An empty tag counts as missing.
fn present(tag: &Option<String>) -> Option<&str> {
    tag.as_deref().filter(|s| !s.is_empty())
}

/// Index `entries` in order and return the finished graph.
pub fn build<I>(entries: I) -> (NodeGraph, IndexReport)
where
    I: IntoIterator<Item = CatalogEntry>,
{
    let mut indexer = ViewIndexer::new();
    for entry in entries {
        indexer.add(entry);
    }
    indexer.finish()
}
