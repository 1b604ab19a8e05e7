use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use musefs::catalog::lister::{Lister, ListerConfig};
use musefs::catalog::{FileRecord, Metadata, MetadataResolver, resolve_entries};
use musefs::vfs::config::VfsConfig;
use musefs::vfs::error::VfsError;
use musefs::vfs::fs::MuseFs;

/// Reads "artist - title" out of the file name; anything else fails.
struct NameResolver;

impl MetadataResolver for NameResolver {
    fn resolve(&self, record: &FileRecord) -> Result<Option<Metadata>, String> {
        let base = record.base_name();
        let (artist, title) = base
            .split_once(" - ")
            .ok_or_else(|| format!("unparseable name {base}"))?;
        Ok(Some(Metadata {
            artist: Some(artist.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }))
    }
}

fn collection(root: &Path) {
    fs::create_dir_all(root.join("a")).unwrap();
    fs::write(root.join("a/Low - Words.mp3"), b"0123456789").unwrap();
    fs::write(root.join("a/Low - Lullaby.FLAC"), b"lullaby").unwrap();
    fs::write(root.join("a/garbage.ogg"), b"??").unwrap();
    fs::write(root.join("a/notes.txt"), b"skip me").unwrap();
    fs::write(root.join("a/.Low - Secret.mp3"), b"hidden").unwrap();
    fs::write(root.join("mix.xspf"), b"<playlist/>").unwrap();
}

fn mount(root: &Path) -> MuseFs {
    let records = Lister::new([root], &ListerConfig::default()).list().unwrap();
    let entries = resolve_entries(records, &NameResolver);
    MuseFs::from_entries(entries, VfsConfig::default()).0
}

#[tokio::test]
async fn serves_files_from_listed_roots() {
    let tmp = tempfile::tempdir().unwrap();
    collection(tmp.path());
    let vfs = mount(tmp.path());

    let artist = vfs.graph().lookup_path("/artist/Low").unwrap().ino();
    let names: HashSet<String> = vfs
        .readdir_ino(artist)
        .unwrap()
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(
        names,
        HashSet::from(["Words.mp3".to_string(), "Lullaby.FLAC".to_string()])
    );
    assert_eq!(vfs.graph().readdir(vfs.root_ino()).unwrap().len(), 2);
    assert_eq!(vfs.graph().catalog().len(), 4);

    let ino = vfs.child_of(artist, "Words.mp3").unwrap();
    let attr = vfs.stat_ino(ino).unwrap();
    assert_eq!(attr.size, 10);
    assert_eq!(attr.perm, 0o600);

    let h = vfs.open(ino, libc::O_RDONLY).await.unwrap();
    assert_eq!(vfs.read(h.id, 2, 3).await.unwrap(), b"234");
    assert_eq!(vfs.read(h.id, 8, 100).await.unwrap(), b"89");
    assert!(vfs.read(h.id, 10, 1).await.unwrap().is_empty());
    vfs.release(h.id).unwrap();
    assert!(matches!(vfs.release(h.id), Err(VfsError::HandleNotFound(_))));
}

#[tokio::test]
async fn vanished_source_surfaces_enoent_on_open() {
    let tmp = tempfile::tempdir().unwrap();
    collection(tmp.path());
    let vfs = mount(tmp.path());

    fs::remove_file(tmp.path().join("a/Low - Words.mp3")).unwrap();
    let ino = vfs.lookup_path("/artist/Low/Words.mp3").unwrap().ino();
    let err = vfs.open(ino, libc::O_RDONLY).await.unwrap_err();
    assert!(matches!(err, VfsError::Io(_)));
    assert_eq!(err.errno(), libc::ENOENT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_open_release_cycles() {
    let tmp = tempfile::tempdir().unwrap();
    collection(tmp.path());
    let vfs = Arc::new(mount(tmp.path()));
    let ino = vfs.lookup_path("/artist/Low/Lullaby.FLAC").unwrap().ino();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let vfs = Arc::clone(&vfs);
            tokio::spawn(async move {
                let h = vfs.open(ino, libc::O_RDONLY).await.unwrap();
                let data = vfs.read(h.id, 0, 64).await.unwrap();
                vfs.release(h.id).unwrap();
                data
            })
        })
        .collect();
    for t in tasks {
        assert_eq!(t.await.unwrap(), b"lullaby");
    }
    assert!(vfs.handles().is_empty());
}
