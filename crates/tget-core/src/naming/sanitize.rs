//! Make a URL-derived name safe to use as a single path component.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Replaces separators, NUL and control characters with `_`, trims
/// surrounding whitespace, and caps the length at 255 bytes. Returns an empty
/// string for names that cannot be used (`.`, `..`, blank).
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed == "." || trimmed == ".." {
        return String::new();
    }

    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
