//! Per-conversation state and the state machine that drives it.
//!
//! States: no entry in the store (idle), then a [`SessionState`] created by
//! the first category choice, which is either browsing a listing page or
//! viewing one article summary.
//!
//! Invariant: `current_page` is always the page whose listing is cached in
//! `last_listing`. A page change fetches the new listing first and commits
//! page and listing together, so a failed fetch leaves the session as it was.
//! Opening an article commits only if the conversation is still on the page
//! the article was resolved against; a page change that landed meanwhile wins.
//!
//! Errors from a request (no category chosen yet, an index past the end of
//! the listing, a render or summarization failure) are reported to that
//! conversation as plain text and are never retried automatically.

use crate::chat::{self, CallbackAction, ChatEvent, ChatTransport, Outgoing};
use crate::error::{NewsError, Result};
use crate::models::{ArticleStub, Category, ChatId};
use crate::scrapers::ArticleExtractor;
use crate::summarizer::Summarizer;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Browsing,
    Viewing { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub category: Category,
    pub current_page: u32,
    pub last_listing: Vec<ArticleStub>,
    pub view: View,
}

/// Conversation states by chat id. Entries are created on first category
/// choice and live as long as the process.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<ChatId, SessionState>>>,
}

impl SessionStore {
    pub async fn get(&self, chat: ChatId) -> Option<SessionState> {
        self.inner.lock().await.get(&chat).cloned()
    }

    pub async fn put(&self, chat: ChatId, state: SessionState) {
        self.inner.lock().await.insert(chat, state);
    }

    /// Record that article `index` of `category`/`page` is being viewed,
    /// refreshing the cached listing. A no-op returning false when the
    /// conversation has moved to another page since the listing was read.
    pub async fn commit_viewing(
        &self,
        chat: ChatId,
        category: Category,
        page: u32,
        listing: Vec<ArticleStub>,
        index: usize,
    ) -> bool {
        let mut sessions = self.inner.lock().await;
        match sessions.get_mut(&chat) {
            Some(state) if state.category == category && state.current_page == page => {
                state.last_listing = listing;
                state.view = View::Viewing { index };
                true
            }
            _ => false,
        }
    }
}

/// Conversations that receive broadcasts.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<RwLock<BTreeSet<ChatId>>>,
}

impl Subscribers {
    /// Returns false if the chat was already subscribed.
    pub async fn subscribe(&self, chat: ChatId) -> bool {
        self.inner.write().await.insert(chat)
    }

    /// Returns false if the chat was not subscribed.
    pub async fn unsubscribe(&self, chat: ChatId) -> bool {
        self.inner.write().await.remove(&chat)
    }

    pub async fn snapshot(&self) -> Vec<ChatId> {
        self.inner.read().await.iter().copied().collect()
    }
}

/// "hour", "4 hours", "30 minutes".
fn every(interval: Duration) -> String {
    let secs = interval.as_secs();
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else {
        ((secs / 60).max(1), "minute")
    };
    if n == 1 {
        unit.to_string()
    } else {
        format!("{n} {unit}s")
    }
}

pub struct ConversationHandler {
    extractor: Arc<ArticleExtractor>,
    summarizer: Arc<Summarizer>,
    sessions: SessionStore,
    subscribers: Subscribers,
    transport: Arc<dyn ChatTransport>,
    broadcast_every: Duration,
}

impl ConversationHandler {
    pub fn new(
        extractor: Arc<ArticleExtractor>,
        summarizer: Arc<Summarizer>,
        subscribers: Subscribers,
        transport: Arc<dyn ChatTransport>,
        broadcast_every: Duration,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            sessions: SessionStore::default(),
            subscribers,
            transport,
            broadcast_every,
        }
    }

    /// Respond to one event and deliver the result (or the error) to the
    /// conversation.
    #[instrument(level = "info", skip(self))]
    pub async fn handle(&self, chat: ChatId, event: ChatEvent) {
        let messages = match self.respond(chat, &event).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Request failed");
                let prefix = match event {
                    ChatEvent::Action(CallbackAction::Article(_)) => "Error summarizing article",
                    _ => "Error fetching articles",
                };
                vec![Outgoing::Text(format!("{prefix}: {e}"))]
            }
        };
        for message in &messages {
            if let Err(e) = self.transport.deliver(chat, message).await {
                error!(error = %e, "Failed to deliver message");
            }
        }
    }

    /// The messages `event` produces, updating session state on success.
    pub async fn respond(&self, chat: ChatId, event: &ChatEvent) -> Result<Vec<Outgoing>> {
        match event {
            ChatEvent::Start => Ok(vec![chat::welcome()]),
            ChatEvent::Subscribe => {
                self.subscribers.subscribe(chat).await;
                info!(%chat, "Subscribed");
                Ok(vec![Outgoing::Text(format!(
                    "You've been subscribed to receive automatic updates every {}.",
                    every(self.broadcast_every)
                ))])
            }
            ChatEvent::Unsubscribe => {
                self.subscribers.unsubscribe(chat).await;
                info!(%chat, "Unsubscribed");
                Ok(vec![Outgoing::Text(
                    "You've been unsubscribed from automatic updates.".to_string(),
                )])
            }
            ChatEvent::GetNews => Ok(vec![chat::category_menu()]),
            ChatEvent::Action(CallbackAction::Category(category)) => {
                self.show_page(chat, *category, category.default_page()).await
            }
            ChatEvent::Action(CallbackAction::Page(page)) => {
                let state = self.require_state(chat).await?;
                if *page == 0 {
                    return Err(NewsError::InvalidPage(*page));
                }
                self.show_page(chat, state.category, *page).await
            }
            ChatEvent::Action(CallbackAction::Article(index)) => {
                self.show_article(chat, *index).await
            }
            ChatEvent::Other(_) => Ok(Vec::new()),
        }
    }

    async fn require_state(&self, chat: ChatId) -> Result<SessionState> {
        self.sessions
            .get(chat)
            .await
            .ok_or(NewsError::SessionStateMissing(chat))
    }

    async fn show_page(&self, chat: ChatId, category: Category, page: u32) -> Result<Vec<Outgoing>> {
        let listing = self.extractor.list_articles(category, page).await?;
        let menu = chat::listing_menu(page, &listing);
        self.sessions
            .put(
                chat,
                SessionState {
                    category,
                    current_page: page,
                    last_listing: listing,
                    view: View::Browsing,
                },
            )
            .await;
        Ok(vec![menu])
    }

    /// Re-resolves the session's listing before indexing into it, so the
    /// index refers to what the page shows now.
    async fn show_article(&self, chat: ChatId, index: usize) -> Result<Vec<Outgoing>> {
        let state = self.require_state(chat).await?;

        let mut session = self.extractor.renderer().open_session();
        let listing = self
            .extractor
            .list_articles_in(&mut session, state.category, state.current_page)
            .await?;
        let stub = listing.get(index).cloned().ok_or(NewsError::IndexOutOfRange {
            index,
            len: listing.len(),
        })?;
        let content = self.extractor.fetch_content_in(&mut session, &stub).await?;
        drop(session);

        let summary = self.summarizer.summarize(&content).await?;
        let committed = self
            .sessions
            .commit_viewing(chat, state.category, state.current_page, listing, index)
            .await;
        if !committed {
            info!(%chat, index, "Conversation changed page meanwhile; keeping its newer state");
        }
        Ok(vec![Outgoing::Text(summary.to_message())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RunRequest, ScrapePipeline};
    use crate::renderer::PageRenderer;
    use crate::retry::RetryPolicy;
    use crate::summarizer::SummarizerConfig;
    use crate::testing::{BASE, FakeBrowser, FakeModel, RecordingTransport, listing_url, serve_listing};

    struct Fixture {
        browser: Arc<FakeBrowser>,
        transport: Arc<RecordingTransport>,
        subscribers: Subscribers,
        extractor: Arc<ArticleExtractor>,
        summarizer: Arc<Summarizer>,
        handler: ConversationHandler,
    }

    fn fixture() -> Fixture {
        fixture_with(FakeModel::new())
    }

    fn fixture_with(model: FakeModel) -> Fixture {
        let browser = Arc::new(FakeBrowser::new());
        let transport = Arc::new(RecordingTransport::new());
        let subscribers = Subscribers::default();
        let extractor = Arc::new(
            ArticleExtractor::new(PageRenderer::new(browser.clone()), BASE).unwrap(),
        );
        let summarizer = Arc::new(
            Summarizer::new(Arc::new(model), SummarizerConfig::default()).unwrap(),
        );
        let handler = ConversationHandler::new(
            Arc::clone(&extractor),
            Arc::clone(&summarizer),
            subscribers.clone(),
            transport.clone(),
            Duration::from_secs(4 * 3600),
        );
        Fixture {
            browser,
            transport,
            subscribers,
            extractor,
            summarizer,
            handler,
        }
    }

    const CHAT: ChatId = ChatId(42);

    fn action(a: CallbackAction) -> ChatEvent {
        ChatEvent::Action(a)
    }

    #[tokio::test]
    async fn test_start_and_get_news() {
        let f = fixture();
        let out = f.handler.respond(CHAT, &ChatEvent::Start).await.unwrap();
        assert!(matches!(out[0], Outgoing::Keyboard { .. }));

        let out = f.handler.respond(CHAT, &ChatEvent::GetNews).await.unwrap();
        assert_eq!(out[0].text(), "Choose a category:");
        assert!(f.handler.sessions.get(CHAT).await.is_none());
    }

    #[tokio::test]
    async fn test_category_choice_opens_default_page() {
        let f = fixture();
        serve_listing(&f.browser, "startups", 2, 12);

        let out = f
            .handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Startups)))
            .await
            .unwrap();

        let Outgoing::Menu { text, menu } = &out[0] else {
            panic!("expected a listing menu");
        };
        assert_eq!(text, "Articles from page 2:");
        assert_eq!(menu.rows.len(), 11);

        let state = f.handler.sessions.get(CHAT).await.unwrap();
        assert_eq!(state.category, Category::Startups);
        assert_eq!(state.current_page, 2);
        assert_eq!(state.last_listing.len(), 12);
        assert_eq!(state.view, View::Browsing);
    }

    #[tokio::test]
    async fn test_page_choice_refreshes_listing() {
        let f = fixture();
        serve_listing(&f.browser, "artificial-intelligence", 1, 3);
        serve_listing(&f.browser, "artificial-intelligence", 4, 2);

        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Ai)))
            .await
            .unwrap();
        let out = f
            .handler
            .respond(CHAT, &action(CallbackAction::Page(4)))
            .await
            .unwrap();

        assert_eq!(out[0].text(), "Articles from page 4:");
        let state = f.handler.sessions.get(CHAT).await.unwrap();
        assert_eq!(state.current_page, 4);
        assert_eq!(state.last_listing[0].title, "artificial-intelligence p4 story 0");
    }

    #[tokio::test]
    async fn test_failed_page_change_keeps_previous_state() {
        let f = fixture();
        serve_listing(&f.browser, "artificial-intelligence", 1, 3);
        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Ai)))
            .await
            .unwrap();
        let before = f.handler.sessions.get(CHAT).await.unwrap();

        let err = f
            .handler
            .respond(CHAT, &action(CallbackAction::Page(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::Render { .. }));
        assert_eq!(f.handler.sessions.get(CHAT).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_actions_without_category_are_session_missing() {
        let f = fixture();
        for event in [action(CallbackAction::Page(3)), action(CallbackAction::Article(0))] {
            let err = f.handler.respond(CHAT, &event).await.unwrap_err();
            assert!(matches!(err, NewsError::SessionStateMissing(ChatId(42))));
        }
        assert!(f.handler.sessions.get(CHAT).await.is_none());
    }

    #[tokio::test]
    async fn test_article_index_out_of_range_leaves_state() {
        let f = fixture();
        serve_listing(&f.browser, "startups", 2, 3);
        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Startups)))
            .await
            .unwrap();
        let before = f.handler.sessions.get(CHAT).await.unwrap();

        let err = f
            .handler
            .respond(CHAT, &action(CallbackAction::Article(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::IndexOutOfRange { index: 3, len: 3 }));
        assert_eq!(f.handler.sessions.get(CHAT).await.unwrap(), before);
        assert_eq!(f.extractor.renderer().active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_article_choice_matches_pipeline_run() {
        let f = fixture();
        serve_listing(&f.browser, "startups", 2, 4);
        serve_listing(&f.browser, "startups", 5, 4);

        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Startups)))
            .await
            .unwrap();
        f.handler
            .respond(CHAT, &action(CallbackAction::Page(5)))
            .await
            .unwrap();
        let out = f
            .handler
            .respond(CHAT, &action(CallbackAction::Article(2)))
            .await
            .unwrap();

        let pipeline = ScrapePipeline::new(
            Arc::clone(&f.extractor),
            Arc::clone(&f.summarizer),
            RetryPolicy::immediate(1),
        );
        let direct = pipeline
            .run(RunRequest::new(Category::Startups, 5, 1, 3))
            .await
            .unwrap();

        assert_eq!(out, vec![Outgoing::Text(direct[2].to_message())]);
        let state = f.handler.sessions.get(CHAT).await.unwrap();
        assert_eq!(state.view, View::Viewing { index: 2 });
        assert_eq!(state.current_page, 5);
    }

    #[tokio::test]
    async fn test_article_choice_rereads_listing() {
        let f = fixture();
        serve_listing(&f.browser, "artificial-intelligence", 1, 2);
        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Ai)))
            .await
            .unwrap();

        // The page gains a newer story before the user picks one.
        serve_listing(&f.browser, "artificial-intelligence", 1, 3);
        let loads_before = f.browser.load_count(&listing_url("artificial-intelligence", 1));
        f.handler
            .respond(CHAT, &action(CallbackAction::Article(2)))
            .await
            .unwrap();

        assert_eq!(
            f.browser.load_count(&listing_url("artificial-intelligence", 1)),
            loads_before + 1
        );
        let state = f.handler.sessions.get(CHAT).await.unwrap();
        assert_eq!(state.last_listing.len(), 3);
    }

    #[tokio::test]
    async fn test_subscribe_then_unsubscribe_restores_set() {
        let f = fixture();
        f.subscribers.subscribe(ChatId(1)).await;
        let before = f.subscribers.snapshot().await;

        f.handler.respond(CHAT, &ChatEvent::Subscribe).await.unwrap();
        assert!(f.subscribers.snapshot().await.contains(&CHAT));
        f.handler.respond(CHAT, &ChatEvent::Unsubscribe).await.unwrap();

        assert_eq!(f.subscribers.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_page_change_during_article_summary_wins() {
        let f = fixture_with(FakeModel::new().with_delay(Duration::from_millis(200)));
        serve_listing(&f.browser, "startups", 2, 3);
        serve_listing(&f.browser, "startups", 5, 3);
        f.handler
            .respond(CHAT, &action(CallbackAction::Category(Category::Startups)))
            .await
            .unwrap();

        let open_article = action(CallbackAction::Article(0));
        let next_page = action(CallbackAction::Page(5));
        let (article, page) = tokio::join!(f.handler.respond(CHAT, &open_article), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.handler.respond(CHAT, &next_page).await
        });

        assert!(article.unwrap()[0].text().starts_with("Title: startups p2 story 0"));
        assert_eq!(page.unwrap()[0].text(), "Articles from page 5:");
        let state = f.handler.sessions.get(CHAT).await.unwrap();
        assert_eq!(state.current_page, 5);
        assert_eq!(state.view, View::Browsing);
        assert_eq!(state.last_listing[0].title, "startups p5 story 0");
    }

    #[test]
    fn test_interval_wording() {
        assert_eq!(every(Duration::from_secs(4 * 3600)), "4 hours");
        assert_eq!(every(Duration::from_secs(3600)), "hour");
        assert_eq!(every(Duration::from_secs(1800)), "30 minutes");
        assert_eq!(every(Duration::from_secs(60)), "minute");
    }

    #[tokio::test]
    async fn test_subscribe_message_for_hourly_broadcast() {
        let browser = Arc::new(FakeBrowser::new());
        let extractor = Arc::new(ArticleExtractor::new(PageRenderer::new(browser), BASE).unwrap());
        let summarizer = Arc::new(
            Summarizer::new(Arc::new(FakeModel::new()), SummarizerConfig::default()).unwrap(),
        );
        let handler = ConversationHandler::new(
            extractor,
            summarizer,
            Subscribers::default(),
            Arc::new(RecordingTransport::new()),
            Duration::from_secs(3600),
        );
        let out = handler.respond(CHAT, &ChatEvent::Subscribe).await.unwrap();
        assert_eq!(
            out[0].text(),
            "You've been subscribed to receive automatic updates every hour."
        );
    }

    #[tokio::test]
    async fn test_subscribe_message_names_interval() {
        let f = fixture();
        let out = f.handler.respond(CHAT, &ChatEvent::Subscribe).await.unwrap();
        assert_eq!(
            out[0].text(),
            "You've been subscribed to receive automatic updates every 4 hours."
        );
    }

    #[tokio::test]
    async fn test_handle_reports_errors_as_text() {
        let f = fixture();
        f.handler
            .handle(CHAT, action(CallbackAction::Article(0)))
            .await;
        let texts = f.transport.texts_to(CHAT);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Error summarizing article: no category selected"));
    }

    #[tokio::test]
    async fn test_handle_delivers_menu() {
        let f = fixture();
        f.handler.handle(CHAT, ChatEvent::GetNews).await;
        f.handler.handle(CHAT, ChatEvent::Other("hello".into())).await;
        assert_eq!(f.transport.texts_to(CHAT), vec!["Choose a category:".to_string()]);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let f = fixture();
        serve_listing(&f.browser, "artificial-intelligence", 1, 2);
        serve_listing(&f.browser, "startups", 2, 2);

        let choose_ai = action(CallbackAction::Category(Category::Ai));
        let choose_startups = action(CallbackAction::Category(Category::Startups));
        let (a, b) = tokio::join!(
            f.handler.respond(ChatId(1), &choose_ai),
            f.handler.respond(ChatId(2), &choose_startups),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(f.handler.sessions.get(ChatId(1)).await.unwrap().category, Category::Ai);
        assert_eq!(
            f.handler.sessions.get(ChatId(2)).await.unwrap().category,
            Category::Startups
        );
        assert_eq!(f.extractor.renderer().active_sessions(), 0);
    }
}
