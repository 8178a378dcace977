//! Deterministic asset filenames: `<id>_<sanitized title>.<ext>`.

use crate::state::manifest::ID_SEPARATOR;

/// Longest sanitized title kept in a filename, in characters.
pub const MAX_TITLE_LEN: usize = 100;

/// Extension used when the URL doesn't offer a plausible one.
pub const DEFAULT_EXTENSION: &str = "jpg";

const MAX_EXTENSION_LEN: usize = 5;
const UNTITLED: &str = "untitled";

/// Build the final filename of an item's asset.
pub fn asset_filename(id: &str, title: &str, url: &str) -> String {
    format!(
        "{}{}{}.{}",
        id,
        ID_SEPARATOR,
        sanitize_title(title),
        extension_from_url(url)
    )
}

/// Replace everything except alphanumerics, `.`, `_` and `-` with `_`,
/// then cap the length. An empty title becomes `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let clean: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TITLE_LEN)
        .collect();
    if clean.is_empty() {
        UNTITLED.to_string()
    } else {
        clean
    }
}

/// Guess a file extension from the last segment of the URL path.
///
/// Anything missing, longer than a few characters or not purely
/// alphanumeric (query-string debris, path noise) falls back to `jpg`.
/// This is a naming heuristic only; content is never sniffed.
pub fn extension_from_url(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// The item id encoded in an asset filename: everything before the first
/// separator. `None` when there is no separator or nothing before it.
pub fn item_id_from_filename(filename: &str) -> Option<&str> {
    match filename.split_once(ID_SEPARATOR) {
        Some((id, _)) if !id.is_empty() => Some(id),
        _ => None,
    }
}
