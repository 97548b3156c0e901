//! Article extraction from the news site.
//!
//! Extraction follows the usual two-phase pattern:
//!
//! 1. **Listing**: render a category listing page and collect its
//!    [`ArticleStub`]s
//! 2. **Content**: render one article page and collect its cleaned body
//!
//! Both phases are side-effect free apart from the render session they use.
//! A failed navigation is a [`NewsError::Render`]; a page without a content
//! container is a successful fetch with an empty body, so callers can tell
//! the two apart.
//!
//! The site template itself (selectors and cleaning rules) lives in
//! [`techcrunch`].

pub mod techcrunch;

use crate::error::{NewsError, Result};
use crate::models::{ArticleContent, ArticleStub, Category};
use crate::renderer::{PageRenderer, RenderSession};
use tracing::{info, instrument, warn};
use url::Url;

pub struct ArticleExtractor {
    renderer: PageRenderer,
    base_url: Url,
}

impl ArticleExtractor {
    pub fn new(renderer: PageRenderer, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| NewsError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        Ok(Self { renderer, base_url })
    }

    pub fn renderer(&self) -> &PageRenderer {
        &self.renderer
    }

    /// `{base}/category/{segment}/page/{page}/`
    pub fn listing_url(&self, category: Category, page: u32) -> String {
        format!(
            "{}/category/{}/page/{}/",
            self.base_url.as_str().trim_end_matches('/'),
            category.segment(),
            page
        )
    }

    /// List the articles of one category page in its own render session.
    pub async fn list_articles(&self, category: Category, page: u32) -> Result<Vec<ArticleStub>> {
        let mut session = self.renderer.open_session();
        self.list_articles_in(&mut session, category, page).await
    }

    #[instrument(level = "info", skip(self, session), fields(session = session.id()))]
    pub async fn list_articles_in(
        &self,
        session: &mut RenderSession,
        category: Category,
        page: u32,
    ) -> Result<Vec<ArticleStub>> {
        if page == 0 {
            return Err(NewsError::InvalidPage(page));
        }
        let url = self.listing_url(category, page);
        let rendered = session.render(&url).await?;
        let stubs = techcrunch::parse_listing(&rendered.html, &self.base_url);
        info!(count = stubs.len(), url = %rendered.url, "Extracted listing");
        Ok(stubs)
    }

    /// Fetch the cleaned body of one article within `session`.
    #[instrument(level = "info", skip_all, fields(session = session.id(), link = %stub.link))]
    pub async fn fetch_content_in(
        &self,
        session: &mut RenderSession,
        stub: &ArticleStub,
    ) -> Result<ArticleContent> {
        let rendered = session.render(&stub.link).await?;
        let body = match techcrunch::parse_content(&rendered.html) {
            Some(body) => {
                info!(chars = body.chars().count(), "Extracted article content");
                body
            }
            None => {
                warn!(url = %rendered.url, "Content container not found; article has no body");
                String::new()
            }
        };
        Ok(ArticleContent {
            stub: stub.clone(),
            body,
        })
    }
}
