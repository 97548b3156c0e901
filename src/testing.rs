//! In-process fakes for the browser, model and chat capabilities.

use crate::api::{Reduce, ReductionRequest};
use crate::chat::{ChatTransport, Outgoing};
use crate::error::{NewsError, Result};
use crate::models::ChatId;
use crate::renderer::Browser;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const BASE: &str = "https://tc.test";

/// Serves canned HTML by URL. Unknown URLs fail like a navigation timeout.
#[derive(Default)]
pub struct FakeBrowser {
    pages: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, usize>>,
    loads: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(&self, url: &str, html: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), html.into());
    }

    /// Fail the next `times` loads of `url`.
    pub fn fail(&self, url: &str, times: usize) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn load_count(&self, url: &str) -> usize {
        self.loads().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn load(&self, url: &str) -> Result<String> {
        self.loads.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(NewsError::render(url, "simulated navigation timeout"));
                }
            }
        }
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| NewsError::render(url, "net::ERR_NAME_NOT_RESOLVED"))
    }
}

/// Deterministic model: the output is a pure function of the prompt.
#[derive(Default)]
pub struct FakeModel {
    calls: Mutex<Vec<ReductionRequest>>,
    failures_left: Mutex<usize>,
    delay: Option<Duration>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next(&self, times: usize) {
        *self.failures_left.lock().unwrap() = times;
    }

    pub fn calls(&self) -> Vec<ReductionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn fingerprint(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Reduce for FakeModel {
    async fn reduce(&self, request: &ReductionRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(NewsError::Summarization("simulated 503".into()));
            }
        }
        Ok(format!(
            "1. Main Subject: digest-{:016x}",
            fingerprint(&request.prompt)
        ))
    }
}

/// Records every delivery; deliveries to chats in `failing` error out.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ChatId, Outgoing)>>,
    failing: Mutex<HashSet<ChatId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat: ChatId) {
        self.failing.lock().unwrap().insert(chat);
    }

    pub fn sent(&self) -> Vec<(ChatId, Outgoing)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, m)| m.text().to_string())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn deliver(&self, chat: ChatId, message: &Outgoing) -> Result<()> {
        if self.failing.lock().unwrap().contains(&chat) {
            return Err(NewsError::Delivery(format!("chat {chat} blocked the bot")));
        }
        self.sent.lock().unwrap().push((chat, message.clone()));
        Ok(())
    }
}

pub fn listing_url(segment: &str, page: u32) -> String {
    format!("{BASE}/category/{segment}/page/{page}/")
}

/// A listing page in the source's block-theme markup.
pub fn listing_html(articles: &[(&str, &str)]) -> String {
    let items: String = articles
        .iter()
        .map(|(title, href)| {
            format!(
                r#"<li class="wp-block-post"><h2 class="wp-block-post-title"><a href="{href}">
                    {title}
                </a></h2><div class="wp-block-post-excerpt">teaser</div></li>"#
            )
        })
        .collect();
    format!(
        r#"<html><head><title>Listing</title></head><body><ul class="wp-block-post-template">{items}</ul></body></html>"#
    )
}

/// An article page with ad and share blocks mixed into the content.
pub fn article_html(paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!(
        r#"<html><body><header><p>Site header</p></header>
        <div class="entry-content wp-block-post-content">
            {body}
            <div class="ad-unit"><p>Advertisement</p></div>
            <div class="social-share"><p>Share on X</p></div>
            <div class="wp-block-tc23-marfeel-experience"><p>Recommended</p></div>
        </div></body></html>"#
    )
}

/// A listing with `count` articles whose pages all have content.
pub fn serve_listing(browser: &FakeBrowser, segment: &str, page: u32, count: usize) -> Vec<String> {
    let entries: Vec<(String, String)> = (0..count)
        .map(|i| {
            (
                format!("{segment} p{page} story {i}"),
                format!("{BASE}/2025/01/0{page}/{segment}-p{page}-story-{i}/"),
            )
        })
        .collect();
    let refs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(t, l)| (t.as_str(), l.as_str()))
        .collect();
    browser.serve(&listing_url(segment, page), listing_html(&refs));
    for (title, link) in &entries {
        let first = format!("{title} opens with a fact.");
        browser.serve(link, article_html(&[&first, "A second paragraph follows."]));
    }
    entries.into_iter().map(|(_, link)| link).collect()
}
