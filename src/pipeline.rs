//! Listing → content → summary, across a range of listing pages.
//!
//! [`PaginationWalker`] gathers stubs page by page. A navigation failure on
//! a later page ends the walk with what was gathered so far; a failure on the
//! first page fails the walk, because nothing was gathered at all.
//!
//! [`ScrapePipeline`] fetches and summarizes every gathered stub, in listing
//! order, within the one render session of the run. Stubs without a usable
//! link, and articles whose page fails to render, are logged and skipped; an
//! article that renders without a body still yields its sentinel summary.
//! [`ScrapePipeline::run_with_retry`] re-runs the whole pipeline from scratch
//! on transient failures (a dead first listing page, a failed reduction).

use crate::error::{NewsError, Result};
use crate::models::{ArticleStub, Category, Summary};
use crate::renderer::RenderSession;
use crate::retry::RetryPolicy;
use crate::scrapers::ArticleExtractor;
use crate::summarizer::Summarizer;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Which listing pages a run covers and how many stubs it takes from each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub category: Category,
    pub start_page: u32,
    pub page_count: u32,
    pub per_page_limit: usize,
}

impl RunRequest {
    pub fn new(category: Category, start_page: u32, page_count: u32, per_page_limit: usize) -> Self {
        Self {
            category,
            start_page,
            page_count,
            per_page_limit,
        }
    }

    /// Only the newest article of a category.
    pub fn latest(category: Category) -> Self {
        Self::new(category, 1, 1, 1)
    }
}

pub struct PaginationWalker {
    extractor: Arc<ArticleExtractor>,
}

impl PaginationWalker {
    pub fn new(extractor: Arc<ArticleExtractor>) -> Self {
        Self { extractor }
    }

    /// Gather the stubs of `request`'s pages within `session`.
    #[instrument(level = "info", skip(self, session), fields(session = session.id()))]
    pub async fn walk_in(
        &self,
        session: &mut RenderSession,
        request: RunRequest,
    ) -> Result<Vec<ArticleStub>> {
        let mut gathered = Vec::new();
        let end = request.start_page.saturating_add(request.page_count);

        for page in request.start_page..end {
            let stubs = match self
                .extractor
                .list_articles_in(session, request.category, page)
                .await
            {
                Ok(stubs) => stubs,
                Err(e @ NewsError::Render { .. }) if page > request.start_page => {
                    warn!(page, gathered = gathered.len(), error = %e, "Navigation failed; ending walk early");
                    break;
                }
                Err(e) => return Err(e),
            };
            let taken = stubs.len().min(request.per_page_limit);
            info!(page, found = stubs.len(), taken, "Walked listing page");
            gathered.extend(stubs.into_iter().take(request.per_page_limit));
        }

        info!(total = gathered.len(), "Walk finished");
        Ok(gathered)
    }
}

pub struct ScrapePipeline {
    extractor: Arc<ArticleExtractor>,
    walker: PaginationWalker,
    summarizer: Arc<Summarizer>,
    retry: RetryPolicy,
}

impl ScrapePipeline {
    pub fn new(extractor: Arc<ArticleExtractor>, summarizer: Arc<Summarizer>, retry: RetryPolicy) -> Self {
        Self {
            walker: PaginationWalker::new(Arc::clone(&extractor)),
            extractor,
            summarizer,
            retry,
        }
    }

    /// One attempt: walk, then fetch and summarize each stub in order.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, request: RunRequest) -> Result<Vec<Summary>> {
        let mut session = self.extractor.renderer().open_session();
        let stubs = self.walker.walk_in(&mut session, request).await?;
        let summaries = self.summarize_stubs(&mut session, &stubs).await?;
        info!(count = summaries.len(), "All articles processed and summarized");
        Ok(summaries)
    }

    /// Fetch and summarize `stubs` in order, skipping those without a
    /// usable link or whose page fails to render.
    pub async fn summarize_stubs(
        &self,
        session: &mut RenderSession,
        stubs: &[ArticleStub],
    ) -> Result<Vec<Summary>> {
        info!(count = stubs.len(), "Processing gathered articles");
        let mut summaries = Vec::with_capacity(stubs.len());
        let mut skipped = 0usize;
        for stub in stubs {
            if !stub.has_usable_link() {
                warn!(title = %stub.title, link = %stub.link, "Skipping article without a usable link");
                continue;
            }
            let content = match self.extractor.fetch_content_in(session, stub).await {
                Ok(content) => content,
                Err(e @ NewsError::Render { .. }) => {
                    warn!(title = %stub.title, error = %e, "Skipping article that failed to render");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summaries.push(self.summarizer.summarize(&content).await?);
        }
        if skipped > 0 {
            warn!(skipped, summarized = summaries.len(), "Some articles could not be fetched");
        }
        Ok(summaries)
    }

    /// [`run`](Self::run) under the retry policy. Each attempt starts over;
    /// results of failed attempts are discarded.
    pub async fn run_with_retry(&self, request: RunRequest) -> Result<Vec<Summary>> {
        self.retry
            .run(&format!("{}-pipeline", request.category), |_| self.run(request))
            .await
    }
}
