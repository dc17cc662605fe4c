//! Utility functions and helpers

use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Create a filesystem-safe, collision-free file stem for an arbitrary key.
///
/// Keys made only of `[A-Za-z0-9_-]` are used verbatim; anything else is
/// hex-encoded behind an `x-` prefix so two distinct keys never share a file.
pub fn safe_file_stem(key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain && !key.starts_with("x-") {
        return key.to_string();
    }

    let mut out = String::with_capacity(2 + key.len() * 2);
    out.push_str("x-");
    for byte in key.as_bytes() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Truncate a string to a maximum byte length, ensuring valid UTF-8 boundaries
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len.saturating_sub(3);
        while !s.is_char_boundary(end) {
            end = end.saturating_sub(1);
        }
        format!("{}...", &s[..end])
    }
}
