//! JSON output for batch runs.
//!
//! Digests are organized by date, one file per category and run:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── startups-081500.json
//!     └── ai-120000.json
//! ```

use crate::error::Result;
use crate::models::{Category, Digest, Summary};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Stamp a batch run's summaries with the local date and time.
pub fn digest(category: Category, summaries: Vec<Summary>) -> Digest {
    let now = Local::now();
    Digest {
        category,
        local_date: now.date_naive().to_string(),
        local_time: now.time().format("%H:%M:%S").to_string(),
        summaries,
    }
}

/// Write a [`Digest`] to `{json_output_dir}/{date}/{category}-{HHMMSS}.json`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.as_ref().display()))]
pub async fn write_digest(digest: &Digest, json_output_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(digest)?;

    let dated_dir = json_output_dir.as_ref().join(&digest.local_date);
    info!(dir = %dated_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&dated_dir).await {
        error!(dir = %dated_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let stamp: String = digest.local_time.chars().filter(char::is_ascii_digit).collect();
    let path = dated_dir.join(format!("{}-{}.json", digest.category, stamp));
    fs::write(&path, json).await?;
    info!(path = %path.display(), summaries = digest.summaries.len(), "Wrote JSON digest");

    Ok(path)
}
