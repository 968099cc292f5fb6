//! Utility functions for file names and user-facing error text

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn invalid_filename_chars() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).ok())
        .as_ref()
}

/// Replace characters that are invalid on common filesystems
///
/// Leading/trailing dots and spaces are stripped. Returns `default` when
/// nothing usable is left.
///
/// # Examples
///
/// ```
/// use comic_courier::utils::safe_filename;
///
/// assert_eq!(safe_filename("a/b:c", "x"), "a_b_c");
/// assert_eq!(safe_filename(" .. ", "fallback"), "fallback");
/// ```
#[must_use]
pub fn safe_filename(name: &str, default: &str) -> String {
    let cleaned = match invalid_filename_chars() {
        Some(re) => re.replace_all(name.trim(), "_").into_owned(),
        None => name.trim().to_string(),
    };
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Limit a file name (suffix included) to `max_len` characters
///
/// The extension is preserved when it fits; the stem is shortened instead.
///
/// # Examples
///
/// ```
/// use comic_courier::utils::clamp_filename_length;
///
/// assert_eq!(clamp_filename_length("short.pdf", 30), "short.pdf");
/// assert_eq!(clamp_filename_length("a_very_long_title.pdf", 10), "a_very.pdf");
/// ```
#[must_use]
pub fn clamp_filename_length(filename: &str, max_len: usize) -> String {
    if filename.chars().count() <= max_len {
        return filename.to_string();
    }

    let suffix = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e));

    match suffix {
        Some(suffix) if suffix.chars().count() < max_len => {
            let base_len = max_len - suffix.chars().count();
            let stem: String = filename.chars().take(base_len).collect();
            format!("{}{}", stem, suffix)
        }
        _ => filename.chars().take(max_len).collect(),
    }
}

/// Simplified upload name used when the platform rejects the original one
///
/// Built as `<prefix><content id>.<original extension>` and clamped to
/// `max_len`.
#[must_use]
pub fn fallback_file_name(prefix: &str, content_id: &str, original: &Path, max_len: usize) -> String {
    let base = safe_filename(&format!("{}{}", prefix, content_id), "artifact");
    let name = match original.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    };
    clamp_filename_length(&name, max_len)
}

/// Remove local filesystem roots from an error message before it is shown to users
///
/// Each root is stripped wherever it occurs; the result is trimmed. If nothing
/// is left, `fallback` is returned.
#[must_use]
pub fn redact_error_text(text: &str, roots: &[PathBuf], fallback: &str) -> String {
    let mut redacted = text.to_string();

    // Longest roots first so a nested root is not left half-stripped
    let mut roots: Vec<String> = roots
        .iter()
        .filter_map(|r| r.to_str())
        .filter(|r| !r.is_empty() && *r != "/")
        .map(|r| r.trim_end_matches('/').to_string())
        .collect();
    roots.sort_by_key(|r| std::cmp::Reverse(r.len()));

    for root in &roots {
        redacted = redacted.replace(root.as_str(), "");
    }

    let cleaned = redacted.replace("//", "/");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Filesystem roots that should never appear in user-facing messages
pub(crate) fn redaction_roots(work_root: &Path) -> Vec<PathBuf> {
    let mut roots = vec![work_root.to_path_buf()];
    if let Ok(canonical) = std::fs::canonicalize(work_root) {
        roots.push(canonical);
    }
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(home) = std::env::var_os("HOME") {
        roots.push(PathBuf::from(home));
    }
    roots
}
