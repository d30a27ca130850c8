use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Extensions stripped from user supplied playlist names.
static KNOWN_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        ".m3u8", ".ts", ".mp4", ".ogg", ".webm", ".ivf", ".mp3", ".json", ".txt",
    ])
});

/// Split after the final `/`: `"a/b/c.m3u8"` gives `("a/b/", "c.m3u8")`.
/// The directory part keeps its trailing separator and is empty when the
/// path has none.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

/// Drop the extension of `filename` if it is one we recognize.
pub fn remove_known_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if KNOWN_EXTENSIONS.contains(&filename[idx..]) => &filename[..idx],
        _ => filename,
    }
}

/// Normalize a raw, user supplied storage name: surrounding whitespace and
/// leading separators are dropped, since storage keys are relative.
pub fn clean(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_string()
}

/// Whether any component of `path` walks up the tree.
pub fn escapes_root(path: &str) -> bool {
    path.split('/').any(|component| component == "..")
}
