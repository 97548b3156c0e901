//! Data models for listings, articles, chunks and summaries.
//!
//! Data flows one way through these types:
//! - [`ArticleStub`]: a title and link scraped from a category listing page
//! - [`ArticleContent`]: the stub plus the cleaned body text of the article
//! - [`DocumentChunk`]: a bounded, overlapping slice of a body (never stored)
//! - [`Summary`]: the structured, length-bounded result for one article
//! - [`Digest`]: a batch run's summaries, as written to the JSON output

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two listing categories the bot knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ai,
    Startups,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Ai, Category::Startups];

    /// The path segment used in listing URLs.
    pub fn segment(self) -> &'static str {
        match self {
            Category::Ai => "artificial-intelligence",
            Category::Startups => "startups",
        }
    }

    /// The identifier used in chat callback data.
    pub fn id(self) -> &'static str {
        match self {
            Category::Ai => "ai",
            Category::Startups => "startups",
        }
    }

    /// Short label used in broadcast headings.
    pub fn label(self) -> &'static str {
        match self {
            Category::Ai => "AI",
            Category::Startups => "Startups",
        }
    }

    /// Label shown on the category choice buttons.
    pub fn menu_label(self) -> &'static str {
        match self {
            Category::Ai => "Artificial Intelligence",
            Category::Startups => "Startups",
        }
    }

    /// The listing page a conversation lands on after choosing this category.
    pub fn default_page(self) -> u32 {
        match self {
            Category::Ai => 1,
            Category::Startups => 2,
        }
    }

    /// Parse either the callback identifier or the URL segment.
    pub fn parse(s: &str) -> Option<Category> {
        match s.trim() {
            "ai" | "artificial-intelligence" => Some(Category::Ai),
            "startups" => Some(Category::Startups),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Identifier of a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A listing-level title and link, before the article itself is fetched.
///
/// Stubs are unique by `link` within one listing page and keep the order in
/// which the page renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStub {
    pub title: String,
    pub link: String,
}

impl ArticleStub {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }

    /// False for missing links and for the placeholders listings use for
    /// unlinked teasers.
    pub fn has_usable_link(&self) -> bool {
        !is_placeholder_href(&self.link)
    }
}

/// Hrefs that do not point at an article.
pub fn is_placeholder_href(href: &str) -> bool {
    let href = href.trim();
    href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href == "about:blank"
}

/// A stub together with the cleaned text of its article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleContent {
    pub stub: ArticleStub,
    /// Paragraphs separated by blank lines. Empty when the page had no
    /// recognised content container.
    pub body: String,
}

impl ArticleContent {
    pub fn is_missing(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// One slice of an article body prepared for the reduction prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub index: usize,
    /// Byte offset of `text` within the body.
    pub offset: usize,
    /// Length in bytes of the prefix shared with the previous chunk.
    pub overlap: usize,
    pub text: String,
}

/// The structured summary of one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub source_link: String,
    pub title: String,
    pub text: String,
}

impl Summary {
    /// The message sent to a conversation for a single article.
    pub fn to_message(&self) -> String {
        format!(
            "Title: {}\nLink: {}\n\nSummary:\n{}",
            self.title, self.source_link, self.text
        )
    }

    /// The message fanned out to subscribers by the broadcast job.
    pub fn to_broadcast_message(&self, category: Category) -> String {
        format!("Latest {} News:\n\n{}", category.label(), self.to_message())
    }
}

/// The summaries produced by one batch run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Digest {
    pub category: Category,
    /// The date of the run in `YYYY-MM-DD` format.
    pub local_date: String,
    pub local_time: String,
    pub summaries: Vec<Summary>,
}
