//! Tag extraction backed by symphonia's probe.

use super::{FileRecord, Metadata, MetadataResolver, Picture};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;

#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaResolver;

impl MetadataResolver for SymphoniaResolver {
    fn resolve(&self, record: &FileRecord) -> Result<Option<Metadata>, String> {
        let path = record.full_path();
        let file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| e.to_string())?;

        // Container tags first (vorbis comments, mp4 atoms), then tags found
        // ahead of the stream (ID3v2).
        let mut revision = probed.format.metadata().skip_to_latest().cloned();
        if revision.is_none() {
            revision = probed.metadata.get().and_then(|m| m.current().cloned());
        }

        match revision {
            Some(rev) => Ok(Some(metadata_from_revision(&rev))),
            None => Err("no tags found".to_string()),
        }
    }
}

pub fn metadata_from_revision(rev: &MetadataRevision) -> Metadata {
    let mut meta = Metadata::default();
    for tag in rev.tags() {
        meta.raw.insert(tag.key.clone(), raw_value(&tag.value));
        let Some(key) = &tag.std_key else {
            continue;
        };
        let text = tag.value.to_string();
        match key {
            StandardTagKey::TrackTitle => set_text(&mut meta.title, &text),
            StandardTagKey::Album => set_text(&mut meta.album, &text),
            StandardTagKey::Artist => set_text(&mut meta.artist, &text),
            StandardTagKey::AlbumArtist => set_text(&mut meta.album_artist, &text),
            StandardTagKey::Composer => set_text(&mut meta.composer, &text),
            StandardTagKey::Genre => set_text(&mut meta.genre, &text),
            StandardTagKey::Comment => set_text(&mut meta.comment, &text),
            StandardTagKey::Lyrics => {
                if meta.lyrics.is_none() && !text.is_empty() {
                    meta.lyrics = Some(text);
                }
            }
            StandardTagKey::Date => {
                if meta.year == 0 {
                    meta.year = parse_year(&text);
                }
            }
            StandardTagKey::TrackNumber => {
                let (n, total) = parse_pair(&text);
                meta.track = n;
                if total > 0 {
                    meta.tracks = total;
                }
            }
            StandardTagKey::TrackTotal => meta.tracks = parse_pair(&text).0,
            StandardTagKey::DiscNumber => {
                let (n, total) = parse_pair(&text);
                meta.disc = n;
                if total > 0 {
                    meta.discs = total;
                }
            }
            StandardTagKey::DiscTotal => meta.discs = parse_pair(&text).0,
            _ => {}
        }
    }

    if let Some(visual) = rev.visuals().first() {
        meta.picture = Some(Picture {
            mime_type: visual.media_type.clone(),
            description: None,
            data: visual.data.to_vec(),
        });
    }
    meta
}

/// Keep the first non-empty value; files often repeat a frame.
fn set_text(slot: &mut Option<String>, value: &str) {
    let value = value.trim();
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

fn raw_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Binary(bytes) => serde_json::Value::from(format!("<{} bytes>", bytes.len())),
        Value::Boolean(b) => serde_json::Value::from(*b),
        Value::Flag => serde_json::Value::Bool(true),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::SignedInt(i) => serde_json::Value::from(*i),
        Value::UnsignedInt(u) => serde_json::Value::from(*u),
        Value::String(s) => serde_json::Value::from(s.as_str()),
    }
}

/// Parse `"3"`, `"3/12"` or `" 03 / 12 "` into `(3, 12)`; garbage reads as 0.
pub fn parse_pair(text: &str) -> (u32, u32) {
    let mut parts = text.splitn(2, '/');
    let first = parts.next().map(leading_number).unwrap_or(0);
    let second = parts.next().map(leading_number).unwrap_or(0);
    (first, second)
}

/// Take the year out of `"2003"`, `"2003-05-01"` or `"2003-05-01T00:00"`.
pub fn parse_year(text: &str) -> i32 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 4 {
        return 0;
    }
    digits[..4].parse().unwrap_or(0)
}

fn leading_number(text: &str) -> u32 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}
