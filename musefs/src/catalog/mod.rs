//! Catalog records
//!
//! Responsibilities:
//! - Describe a discovered physical file (`FileRecord`) and what the tag
//!   resolver made of it (`Metadata`, or an error string).
//! - Pair the two into a `CatalogEntry`, the immutable unit the view indexer
//!   consumes and the node graph owns for the lifetime of the mount.
//!
//! Submodules:
//! - `lister`: walks the configured roots and produces `FileRecord`s
//! - `tags`: symphonia-backed `MetadataResolver`
pub mod lister;
pub mod tags;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// What kind of file the lister found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Playlist,
}

/// A physical file discovered under one of the catalog roots.
#[derive(Clone, Debug, Serialize)]
pub struct FileRecord {
    /// Root the file was discovered under.
    pub prefix: PathBuf,
    /// Path relative to `prefix`.
    pub path: PathBuf,
    pub size: u64,
    pub mod_time: SystemTime,
    pub kind: FileKind,
}

impl FileRecord {
    pub fn full_path(&self) -> PathBuf {
        self.prefix.join(&self.path)
    }

    /// File name with the final extension removed.
    pub fn base_name(&self) -> String {
        let name = file_name(&self.path);
        match name.rfind('.') {
            Some(idx) if idx > 0 => name[..idx].to_string(),
            _ => name,
        }
    }

    /// Final extension including the leading dot, or an empty string.
    pub fn extension(&self) -> String {
        let name = file_name(&self.path);
        match name.rfind('.') {
            Some(idx) if idx > 0 => name[idx..].to_string(),
            _ => String::new(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Embedded artwork found in the tags.
#[derive(Clone, Debug, Serialize)]
pub struct Picture {
    pub mime_type: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Parsed tag data for one audio file.
///
/// Text fields are trimmed by the resolver; an empty tag is stored as `None`.
/// Numeric fields use 0 for "absent".
#[derive(Clone, Debug, Default, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub year: i32,
    pub genre: Option<String>,
    pub track: u32,
    pub tracks: u32,
    pub disc: u32,
    pub discs: u32,
    pub lyrics: Option<String>,
    pub comment: Option<String>,
    pub picture: Option<Picture>,
    /// Every tag as read from the file. Key names are format specific.
    pub raw: BTreeMap<String, serde_json::Value>,
}

/// A discovered file plus its resolved metadata or failure reason.
#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub file: FileRecord,
    pub metadata: Option<Metadata>,
    pub error: Option<String>,
}

impl CatalogEntry {
    pub fn new(file: FileRecord, resolved: Result<Option<Metadata>, String>) -> Self {
        match resolved {
            Ok(metadata) => Self {
                file,
                metadata,
                error: None,
            },
            Err(error) => Self {
                file,
                metadata: None,
                error: Some(error),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Turns a file into tag data.
///
/// `Ok(None)` means the file was readable but carried nothing usable;
/// `Err` carries the reason extraction failed.
pub trait MetadataResolver {
    fn resolve(&self, record: &FileRecord) -> Result<Option<Metadata>, String>;
}

/// Resolve every audio record into a `CatalogEntry`, preserving input order.
///
/// Playlist records are passed through without resolution.
pub fn resolve_entries<R>(records: Vec<FileRecord>, resolver: &R) -> Vec<CatalogEntry>
where
    R: MetadataResolver + ?Sized,
{
    records
        .into_iter()
        .map(|record| {
            if record.kind != FileKind::Audio {
                return CatalogEntry::new(record, Ok(None));
            }
            let resolved = resolver.resolve(&record);
            match &resolved {
                Ok(_) => debug!(path = %record.full_path().display(), "tags resolved"),
                Err(e) => warn!(path = %record.full_path().display(), error = %e, "tag extraction failed"),
            }
            CatalogEntry::new(record, resolved)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testutil::record;
    use super::*;

    struct Fixed;

    impl MetadataResolver for Fixed {
        fn resolve(&self, record: &FileRecord) -> Result<Option<Metadata>, String> {
            if record.path.ends_with("bad.mp3") {
                Err("no tags found".into())
            } else {
                Ok(Some(Metadata::default()))
            }
        }
    }

    #[test]
    fn test_record_name_parts() {
        let r = record("a/b/01 Song.v2.flac");
        assert_eq!(r.base_name(), "01 Song.v2");
        assert_eq!(r.extension(), ".flac");
        assert_eq!(r.full_path(), PathBuf::from("/music/a/b/01 Song.v2.flac"));

        let bare = record("README");
        assert_eq!(bare.base_name(), "README");
        assert_eq!(bare.extension(), "");
    }

    #[test]
    fn test_resolve_entries_keeps_order_and_errors() {
        let mut playlist = record("list.xspf");
        playlist.kind = FileKind::Playlist;
        let records = vec![record("good.mp3"), record("bad.mp3"), playlist];

        let entries = resolve_entries(records, &Fixed);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].metadata.is_some() && entries[0].error.is_none());
        assert!(entries[1].is_failed());
        assert_eq!(entries[1].error.as_deref(), Some("no tags found"));
        assert!(entries[2].metadata.is_none() && entries[2].error.is_none());
    }
}
