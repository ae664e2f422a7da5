//! Collects the URLs to download from arguments or URL list files.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// One URL per line; blank and whitespace-only lines are skipped.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// URLs from `args`, or from the files they name when `from_file` is set.
/// Every file contributes its URLs, in argument order.
pub fn collect_urls(args: &[String], from_file: bool) -> Result<Vec<String>> {
    if !from_file {
        return Ok(args
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect());
    }
    let mut urls = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let found = parse_url_list(&text);
        tracing::debug!(file = %path.display(), urls = found.len(), "read URL list");
        urls.extend(found);
    }
    Ok(urls)
}
