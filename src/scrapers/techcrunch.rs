//! TechCrunch listing and article templates.
//!
//! Category listings live at `{base}/category/{segment}/page/{n}/` and render
//! each teaser title as `h2.wp-block-post-title > a`. Article bodies sit in
//! `.entry-content.wp-block-post-content`, interleaved with ad slots, share
//! widgets and recommendation blocks that are not part of the story.

use crate::models::{ArticleStub, is_placeholder_href};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.wp-block-post-title").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static CONTENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".entry-content.wp-block-post-content").unwrap());
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static EXCLUDED_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".ad-unit, .wp-block-tc23-marfeel-experience, .social-share").unwrap()
});

fn normalize_text<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces.flat_map(str::split_whitespace).join(" ")
}

/// Extract the article stubs of a listing page, in page order.
///
/// Entries whose anchor is missing, has no href, or points at a placeholder
/// are dropped. Relative links are resolved against `base`. Duplicate links
/// keep their first occurrence.
pub fn parse_listing(html: &str, base: &Url) -> Vec<ArticleStub> {
    let document = Html::parse_document(html);
    let mut stubs = Vec::new();

    for (position, heading) in document.select(&TITLE_SELECTOR).enumerate() {
        let Some(anchor) = heading.select(&ANCHOR_SELECTOR).next() else {
            debug!(position, "Skipped listing entry without a link");
            continue;
        };
        let title = normalize_text(anchor.text());
        let href = anchor.value().attr("href").unwrap_or_default();
        if title.is_empty() || is_placeholder_href(href) {
            debug!(position, %href, "Skipped listing entry with empty title or placeholder link");
            continue;
        }
        match base.join(href.trim()) {
            Ok(link) => stubs.push(ArticleStub::new(title, link.to_string())),
            Err(e) => warn!(position, %href, error = %e, "Skipped unresolvable listing link"),
        }
    }

    stubs.into_iter().unique_by(|s| s.link.clone()).collect()
}

fn is_excluded(paragraph: &ElementRef, container: &ElementRef) -> bool {
    if EXCLUDED_SELECTOR.matches(paragraph) {
        return true;
    }
    for node in paragraph.ancestors() {
        if node.id() == container.id() {
            break;
        }
        if let Some(element) = ElementRef::wrap(node) {
            if EXCLUDED_SELECTOR.matches(&element) {
                return true;
            }
        }
    }
    false
}

/// Extract the cleaned body of an article page.
///
/// Returns `None` when the page has no content container. Otherwise returns
/// the story's paragraphs in document order, separated by blank lines, with
/// ads, share widgets and recommendation blocks left out.
pub fn parse_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let container = document.select(&CONTENT_SELECTOR).next()?;

    let body = container
        .select(&PARAGRAPH_SELECTOR)
        .filter(|p| !is_excluded(p, &container))
        .map(|p| normalize_text(p.text()))
        .filter(|text| !text.is_empty())
        .join("\n\n");
    Some(body)
}
