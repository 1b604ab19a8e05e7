//! Walks catalog roots and emits audio and playlist file records.

use super::{FileKind, FileRecord};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    ".oga", ".mp3", ".ogg", ".opus", ".flac", ".mp4", ".m4a", ".alac", ".aac",
];
pub const PLAYLIST_EXTENSIONS: &[&str] = &[".xspf"];

/// macOS resource-fork directories left behind on shared volumes.
const APPLE_DOUBLE: &str = ".appledouble";

#[derive(Clone, Debug)]
pub struct ListerConfig {
    pub audio_extensions: Vec<String>,
    pub playlist_extensions: Vec<String>,
}

impl Default for ListerConfig {
    fn default() -> Self {
        Self {
            audio_extensions: AUDIO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            playlist_extensions: PLAYLIST_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct Lister {
    roots: Vec<PathBuf>,
    audio: HashSet<String>,
    playlist: HashSet<String>,
}

impl Lister {
    pub fn new<I, P>(roots: I, config: &ListerConfig) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let lower = |exts: &[String]| -> HashSet<String> {
            exts.iter().map(|e| e.to_ascii_lowercase()).collect()
        };
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            audio: lower(&config.audio_extensions),
            playlist: lower(&config.playlist_extensions),
        }
    }

    /// List every matching file under every root, roots in the order given
    /// and entries sorted by name within each directory.
    pub fn list(&self) -> io::Result<Vec<FileRecord>> {
        let mut files = Vec::new();
        for root in &self.roots {
            let root = std::path::absolute(root)?;
            debug!(root = %root.display(), "listing catalog root");
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_dir() {
                    continue;
                }
                let path = entry.path();
                let Some(kind) = self.classify(path) else {
                    continue;
                };
                let rel = path.strip_prefix(&root).map_err(|_| {
                    io::Error::other(format!(
                        "could not separate path {} from prefix {}",
                        path.display(),
                        root.display()
                    ))
                })?;
                if is_hidden(rel) {
                    trace!(path = %path.display(), "skipping hidden file");
                    continue;
                }
                let st = std::fs::metadata(path)?;
                if st.is_dir() {
                    continue;
                }
                files.push(FileRecord {
                    prefix: root.clone(),
                    path: rel.to_path_buf(),
                    size: st.len(),
                    mod_time: st.modified()?,
                    kind,
                });
            }
        }
        Ok(files)
    }

    fn classify(&self, path: &Path) -> Option<FileKind> {
        let name = path.file_name()?.to_string_lossy();
        let ext = match name.rfind('.') {
            Some(idx) => name[idx..].to_ascii_lowercase(),
            None => return None,
        };
        if self.audio.contains(&ext) {
            Some(FileKind::Audio)
        } else if self.playlist.contains(&ext) {
            Some(FileKind::Playlist)
        } else {
            None
        }
    }
}

fn is_hidden(rel: &Path) -> bool {
    let dot_file = rel
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'));
    dot_file
        || rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(APPLE_DOUBLE))
}
