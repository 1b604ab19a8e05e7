//! Naming rules for virtual path segments and leaf names.

/// Replace ASCII control characters and `\ / " ? : * < > |` with `_`.
///
/// A segment made only of dots would alias `.` or `..`, so its dots become
/// underscores as well.
pub fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        return "_".repeat(cleaned.len());
    }
    cleaned
}

fn is_forbidden(c: char) -> bool {
    c.is_ascii_control() || matches!(c, '\\' | '/' | '"' | '?' | ':' | '*' | '<' | '>' | '|')
}

/// Title used inside an album directory.
///
/// `"DD-TT Title"` for multi-disc (or unknown disc count) sets, `"TT Title"`
/// when only the track is known, otherwise the bare title.
pub fn album_title(title: &str, track: u32, disc: u32, discs: u32) -> String {
    if disc > 0 && (discs > 1 || discs == 0) && track > 0 {
        format!("{disc:02}-{track:02} {title}")
    } else if track > 0 {
        format!("{track:02} {title}")
    } else {
        title.to_string()
    }
}

/// Append a random 63-bit disambiguator: `"<base>.<n>"`.
pub fn disambiguate(base: &str) -> String {
    format!("{base}.{}", rand::random::<u64>() >> 1)
}

/// Candidate leaf name for the `n`th occupant of a name (1-based):
/// `"Title.mp3"`, `"Title v2.mp3"`, `"Title v3.mp3"`, ...
pub fn versioned(title: &str, n: u32, ext: &str) -> String {
    if n <= 1 {
        format!("{title}{ext}")
    } else {
        format!("{title} v{n}{ext}")
    }
}
