//! Error taxonomy shared by the pipeline, the chat flow and the scheduler.
//!
//! Render and summarization failures are transient and may be retried at
//! run granularity. Session and index errors are the user's to fix and are
//! reported back to the conversation. An article page without a content
//! container is not an error at all: it yields an empty body.

use crate::models::ChatId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsError {
    /// Navigation against the source site failed (timeout, network, HTTP status).
    #[error("failed to render {url}: {reason}")]
    Render { url: String, reason: String },

    /// The reduction capability timed out or returned an error.
    #[error("summarization failed: {0}")]
    Summarization(String),

    #[error("no category selected yet for chat {0}; choose a category first")]
    SessionStateMissing(ChatId),

    #[error("article {index} is not on this page (it lists {len} articles)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("page {0} does not exist; pages start at 1")]
    InvalidPage(u32),

    #[error("chat delivery failed: {0}")]
    Delivery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NewsError {
    pub fn render(url: impl Into<String>, reason: impl ToString) -> Self {
        NewsError::Render {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a whole-run retry has a chance of clearing this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NewsError::Render { .. } | NewsError::Summarization(_))
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;
