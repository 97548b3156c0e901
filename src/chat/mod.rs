//! Conversation events, outgoing messages and the transport that delivers them.
//!
//! Inbound updates are parsed into [`ChatEvent`]s: the `/start`,
//! `/subscribe` and `/unsubscribe` commands, the "Get News" text trigger,
//! and menu callbacks ([`CallbackAction`]). Outbound messages are
//! [`Outgoing`] values, either plain text, text with an inline choice menu,
//! or text with a persistent reply keyboard.
//!
//! Callback data wire format: `ai`, `startups`, `article_{index}`,
//! `page_{number}`.

pub mod telegram;

use crate::error::Result;
use crate::models::{ArticleStub, Category, ChatId};
use crate::utils::truncate_title;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

pub const GET_NEWS: &str = "Get News";
pub const MAX_MENU_TITLES: usize = 10;
pub const PAGINATION_WIDTH: u32 = 5;
pub const MENU_TITLE_CHARS: usize = 30;

static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(start|subscribe|unsubscribe)(?:@\w+)?(?:\s|$)").unwrap());

/// A choice made from an inline menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Category(Category),
    /// Index into the listing last shown to the conversation.
    Article(usize),
    /// Absolute listing page number.
    Page(u32),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(category) = Category::parse(data) {
            return Some(CallbackAction::Category(category));
        }
        if let Some(index) = data.strip_prefix("article_") {
            return index.parse().ok().map(CallbackAction::Article);
        }
        if let Some(page) = data.strip_prefix("page_") {
            return page.parse().ok().map(CallbackAction::Page);
        }
        None
    }

    pub fn data(&self) -> String {
        match self {
            CallbackAction::Category(category) => category.id().to_string(),
            CallbackAction::Article(index) => format!("article_{index}"),
            CallbackAction::Page(page) => format!("page_{page}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Start,
    Subscribe,
    Unsubscribe,
    GetNews,
    Action(CallbackAction),
    /// Text the bot does not react to.
    Other(String),
}

impl ChatEvent {
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(caps) = COMMAND_RE.captures(trimmed) {
            return match &caps[1] {
                "start" => ChatEvent::Start,
                "subscribe" => ChatEvent::Subscribe,
                _ => ChatEvent::Unsubscribe,
            };
        }
        if trimmed == GET_NEWS {
            return ChatEvent::GetNews;
        }
        ChatEvent::Other(trimmed.to_string())
    }

    pub fn from_callback(data: &str) -> Self {
        match CallbackAction::parse(data) {
            Some(action) => ChatEvent::Action(action),
            None => ChatEvent::Other(data.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub action: CallbackAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineMenu {
    pub rows: Vec<Vec<MenuButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Menu { text: String, menu: InlineMenu },
    Keyboard { text: String, buttons: Vec<Vec<String>> },
}

impl Outgoing {
    pub fn text(&self) -> &str {
        match self {
            Outgoing::Text(text) => text,
            Outgoing::Menu { text, .. } => text,
            Outgoing::Keyboard { text, .. } => text,
        }
    }
}

/// Delivers messages to conversations.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, chat: ChatId, message: &Outgoing) -> Result<()>;
}

pub fn welcome() -> Outgoing {
    Outgoing::Keyboard {
        text: format!(
            "Welcome to the TechCrunch Scraper Bot! Click '{GET_NEWS}' to start or use /subscribe to receive automatic updates."
        ),
        buttons: vec![vec![GET_NEWS.to_string()]],
    }
}

pub fn category_menu() -> Outgoing {
    let rows = Category::ALL
        .iter()
        .map(|&category| {
            vec![MenuButton {
                label: category.menu_label().to_string(),
                action: CallbackAction::Category(category),
            }]
        })
        .collect();
    Outgoing::Menu {
        text: "Choose a category:".to_string(),
        menu: InlineMenu { rows },
    }
}

/// Up to [`MAX_MENU_TITLES`] truncated titles, one per row, then a strip of
/// the next [`PAGINATION_WIDTH`] page numbers starting at `page`.
pub fn listing_menu(page: u32, listing: &[ArticleStub]) -> Outgoing {
    let mut rows: Vec<Vec<MenuButton>> = listing
        .iter()
        .take(MAX_MENU_TITLES)
        .enumerate()
        .map(|(i, stub)| {
            vec![MenuButton {
                label: truncate_title(&stub.title, MENU_TITLE_CHARS),
                action: CallbackAction::Article(i),
            }]
        })
        .collect();
    rows.push(
        (page..page.saturating_add(PAGINATION_WIDTH))
            .map(|p| MenuButton {
                label: p.to_string(),
                action: CallbackAction::Page(p),
            })
            .collect(),
    );

    let text = if listing.is_empty() {
        format!("No articles found on page {page}.")
    } else {
        format!("Articles from page {page}:")
    };
    Outgoing::Menu {
        text,
        menu: InlineMenu { rows },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatEvent::from_text("/start"), ChatEvent::Start);
        assert_eq!(ChatEvent::from_text("/subscribe"), ChatEvent::Subscribe);
        assert_eq!(ChatEvent::from_text("/unsubscribe@tc_digest_bot"), ChatEvent::Unsubscribe);
        assert_eq!(ChatEvent::from_text(" /start now"), ChatEvent::Start);
        assert_eq!(
            ChatEvent::from_text("/subscribers"),
            ChatEvent::Other("/subscribers".into())
        );
    }

    #[test]
    fn test_parse_get_news_trigger() {
        assert_eq!(ChatEvent::from_text("Get News"), ChatEvent::GetNews);
        assert_eq!(ChatEvent::from_text("get news"), ChatEvent::Other("get news".into()));
    }

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(
            ChatEvent::from_callback("ai"),
            ChatEvent::Action(CallbackAction::Category(Category::Ai))
        );
        assert_eq!(
            ChatEvent::from_callback("article_2"),
            ChatEvent::Action(CallbackAction::Article(2))
        );
        assert_eq!(
            ChatEvent::from_callback("page_5"),
            ChatEvent::Action(CallbackAction::Page(5))
        );
        assert_eq!(ChatEvent::from_callback("page_x"), ChatEvent::Other("page_x".into()));
        assert_eq!(ChatEvent::from_callback("article_-1"), ChatEvent::Other("article_-1".into()));
    }

    #[test]
    fn test_callback_data_wire_format() {
        for action in [
            CallbackAction::Category(Category::Startups),
            CallbackAction::Article(7),
            CallbackAction::Page(12),
        ] {
            assert_eq!(CallbackAction::parse(&action.data()), Some(action));
        }
        assert_eq!(CallbackAction::Category(Category::Ai).data(), "ai");
    }

    #[test]
    fn test_category_menu() {
        let Outgoing::Menu { text, menu } = category_menu() else {
            panic!("expected a menu");
        };
        assert_eq!(text, "Choose a category:");
        let labels: Vec<_> = menu.rows.iter().flatten().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Artificial Intelligence", "Startups"]);
    }

    #[test]
    fn test_listing_menu_limits_titles_and_adds_pagination() {
        let listing: Vec<ArticleStub> = (0..14)
            .map(|i| ArticleStub::new(format!("A rather long headline about startup number {i}"), format!("https://x/{i}")))
            .collect();
        let Outgoing::Menu { text, menu } = listing_menu(5, &listing) else {
            panic!("expected a menu");
        };
        assert_eq!(text, "Articles from page 5:");
        assert_eq!(menu.rows.len(), MAX_MENU_TITLES + 1);
        assert_eq!(menu.rows[0][0].label, "A rather long headline about s...");
        assert_eq!(menu.rows[9][0].action, CallbackAction::Article(9));

        let strip: Vec<_> = menu.rows.last().unwrap().iter().map(|b| b.action).collect();
        assert_eq!(
            strip,
            (5..10).map(CallbackAction::Page).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_listing_menu_for_empty_page() {
        let menu = listing_menu(3, &[]);
        assert_eq!(menu.text(), "No articles found on page 3.");
    }
}
