//! Rate-limit placeholder ("stub") detection.
//!
//! When the asset CDN throttles a client it answers with a tiny fixed HTML
//! page instead of the image. Older exports saved that page under the
//! asset's final name; those files are the stubs the recovery scanner hunts
//! for. A file is a stub only when BOTH its length equals the error page's
//! length AND it contains the marker, so a legitimately tiny real asset is
//! never mistaken for one.

use std::io::Read;
use std::path::Path;

/// The throttling page served by the asset CDN.
pub const RATE_LIMIT_PAGE: &str = "<html>\r\n\
<head><title>429 Too Many Requests</title></head>\r\n\
<body>\r\n\
<center><h1>429 Too Many Requests</h1></center>\r\n\
<hr><center>nginx</center>\r\n\
</body>\r\n\
</html>\r\n";

/// Marker string that must appear in a stub's content.
pub const RATE_LIMIT_MARKER: &str = "429 Too Many Requests";

/// Exact byte length of a stub file.
pub const STUB_LEN: u64 = RATE_LIMIT_PAGE.len() as u64;

/// Whether an in-memory body matches the stub signature.
pub fn is_stub_bytes(body: &[u8]) -> bool {
    body.len() as u64 == STUB_LEN && contains_marker(body)
}

/// Whether the file at `path` is a stub.
///
/// The content is only read when the length already matches, so scanning a
/// directory of multi-megabyte photos stays a metadata-only walk.
pub fn is_stub(path: &Path) -> std::io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() || metadata.len() != STUB_LEN {
        return Ok(false);
    }
    let mut content = Vec::with_capacity(STUB_LEN as usize);
    std::fs::File::open(path)?.read_to_end(&mut content)?;
    Ok(is_stub_bytes(&content))
}

fn contains_marker(body: &[u8]) -> bool {
    let marker = RATE_LIMIT_MARKER.as_bytes();
    body.windows(marker.len()).any(|w| w == marker)
}

/// Whether a response body looks like an HTML error page rather than the
/// JSON the API promised. Only the leading tag counts: JSON that merely
/// quotes the marker (a photo titled "429 Too Many Requests") is not HTML.
pub fn looks_like_html(body: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head: Vec<u8> = body[start..]
        .iter()
        .take(16)
        .map(|b| b.to_ascii_lowercase())
        .collect();
    head.starts_with(b"<!doctype html") || head.starts_with(b"<html")
}
