//! Output of batch runs.
//!
//! Every batch run logs its summaries; with `--json-output-dir` it also
//! writes them as a dated JSON digest (see [`json`]).

pub mod json;

use crate::models::Summary;
use tracing::info;

/// Log each summary the way the console report shows it.
pub fn log_summaries(summaries: &[Summary]) {
    info!(total = summaries.len(), "Scraping and summarization completed successfully");
    for (index, summary) in summaries.iter().enumerate() {
        info!(
            article = index + 1,
            title = %summary.title,
            link = %summary.source_link,
            "Summary:\n{}",
            summary.text
        );
    }
}
