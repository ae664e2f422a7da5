//! Candidate file name from a task URL.

use percent_encoding::percent_decode_str;
use url::Url;

use super::sanitize::sanitize_component;

/// Last non-empty path segment, percent-decoded and sanitized.
///
/// Root requests (`https://host/`, `https://host`) and segments that sanitize
/// to nothing map to `<host>_index.html`.
pub fn base_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .map(|s| sanitize_component(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| index_name(url))
}

fn index_name(url: &Url) -> String {
    let host = url.host_str().map(sanitize_component).unwrap_or_default();
    if host.is_empty() {
        "index.html".to_string()
    } else {
        format!("{}_index.html", host)
    }
}
