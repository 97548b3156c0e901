//! String and file system helpers.
//!
//! - Truncation for logs and for menu labels
//! - Output directory validation for batch runs

use crate::error::Result;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

fn char_boundary(s: &str, max_chars: usize) -> Option<usize> {
    s.char_indices().nth(max_chars).map(|(i, _)| i)
}

/// Truncate a string for logging purposes.
///
/// Strings longer than `max` characters are cut and get `"…(+N bytes)"`
/// appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match char_boundary(s, max) {
        None => s.to_string(),
        Some(cut) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Shorten a title to `max` characters followed by `...`.
pub fn truncate_title(title: &str, max: usize) -> String {
    match char_boundary(title, max) {
        None => title.to_string(),
        Some(cut) => format!("{}...", &title[..cut]),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn ensure_writable_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Err(e) = fs::create_dir_all(path).await {
        error!(error = %e, "Cannot create output directory");
        return Err(e.into());
    }
    let scratch_path = path.join("..__write_check__");
    match fs::write(&scratch_path, b"").await {
        Ok(()) => {
            let _ = fs::remove_file(&scratch_path).await;
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Output directory is not writable");
            Err(e.into())
        }
    }
}
