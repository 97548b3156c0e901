//! Page rendering behind a [`Browser`] capability.
//!
//! A [`PageRenderer`] hands out [`RenderSession`]s. A session is open from
//! [`PageRenderer::open_session`] until it is dropped, so it is released on
//! every exit path: success, early return on error, and cancellation of the
//! future that owns it. Every walk, pipeline run and interactive request
//! opens exactly one session and owns it for its whole duration.

use crate::error::{NewsError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Loads a URL and returns the rendered HTML.
///
/// Failures to navigate (timeouts, network errors, error statuses) must be
/// reported as [`NewsError::Render`].
#[async_trait]
pub trait Browser: Send + Sync {
    async fn load(&self, url: &str) -> Result<String>;
}

/// [`Browser`] over plain HTTP. The source's listing and article pages are
/// rendered server-side, so the fetched document is the rendered DOM.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    pub fn new(navigation_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(navigation_timeout)
            .build()
            .map_err(|e| NewsError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn load(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NewsError::render(url, e))?;
        let response = response
            .error_for_status()
            .map_err(|e| NewsError::render(url, e))?;
        response.text().await.map_err(|e| NewsError::render(url, e))
    }
}

/// Hands out scoped rendering sessions over a shared [`Browser`].
#[derive(Clone)]
pub struct PageRenderer {
    browser: Arc<dyn Browser>,
    active: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl PageRenderer {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self {
            browser,
            active: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn open_session(&self) -> RenderSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let open = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session = id, open, "Opened render session");
        RenderSession {
            id,
            browser: Arc::clone(&self.browser),
            active: Arc::clone(&self.active),
        }
    }

    /// Sessions opened and not yet released.
    #[cfg(test)]
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// One open rendering session. Released when dropped.
pub struct RenderSession {
    id: u64,
    browser: Arc<dyn Browser>,
    active: Arc<AtomicUsize>,
}

impl RenderSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Navigate to `url` and return the rendered page.
    #[instrument(level = "info", skip_all, fields(session = self.id, %url))]
    pub async fn render(&mut self, url: &str) -> Result<RenderedPage> {
        let t0 = Instant::now();
        match self.browser.load(url).await {
            Ok(html) => {
                debug!(
                    bytes = html.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Rendered page"
                );
                Ok(RenderedPage {
                    url: url.to_string(),
                    html,
                })
            }
            Err(e) => {
                warn!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    error = %e,
                    "Navigation failed"
                );
                Err(e)
            }
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        let open = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(session = self.id, open, "Released render session");
    }
}

/// A page as rendered by a session.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}
