// File-system safe names for portal titles

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));

const FALLBACK_NAME: &str = "untitled";

/// Replace characters that are not allowed in file names on common platforms
pub fn sanitize_file_name(name: &str) -> String {
    let normalized: String = name.nfc().collect();
    let replaced = FORBIDDEN.replace_all(&normalized, "_");
    // Windows refuses trailing dots and spaces
    let trimmed = replaced.trim().trim_end_matches('.').trim_end();

    match trimmed {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        other => other.to_string(),
    }
}
