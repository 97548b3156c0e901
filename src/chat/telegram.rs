//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates`, turns each update into a [`ChatEvent`] and hands
//! it to the [`ConversationHandler`] on its own task, so conversations are
//! served concurrently. Outgoing messages go through `sendMessage`, with
//! inline menus and the reply keyboard encoded as `reply_markup`.

use super::{ChatEvent, ChatTransport, Outgoing};
use crate::error::{NewsError, Result};
use crate::models::ChatId;
use crate::session::ConversationHandler;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<Message>,
}

/// An update the bot reacts to.
#[derive(Debug, PartialEq)]
pub struct Inbound {
    pub chat: ChatId,
    pub event: ChatEvent,
    /// Set for callback queries, which must be acknowledged.
    pub callback_id: Option<String>,
}

impl Update {
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(query) = self.callback_query {
            let chat = query.message.as_ref()?.chat.id;
            let data = query.data.as_deref().unwrap_or_default();
            return Some(Inbound {
                chat: ChatId(chat),
                event: ChatEvent::from_callback(data),
                callback_id: Some(query.id),
            });
        }
        let message = self.message?;
        let text = message.text?;
        Some(Inbound {
            chat: ChatId(message.chat.id),
            event: ChatEvent::from_text(&text),
            callback_id: None,
        })
    }
}

/// The `sendMessage` payload for one outgoing message.
pub fn send_message_body(chat: ChatId, message: &Outgoing) -> Value {
    let mut body = json!({ "chat_id": chat.0, "text": message.text() });
    match message {
        Outgoing::Text(_) => {}
        Outgoing::Menu { menu, .. } => {
            let keyboard: Vec<Vec<Value>> = menu
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({ "text": b.label, "callback_data": b.action.data() }))
                        .collect()
                })
                .collect();
            body["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        Outgoing::Keyboard { buttons, .. } => {
            body["reply_markup"] = json!({
                "keyboard": buttons,
                "resize_keyboard": true,
                "one_time_keyboard": false,
            });
        }
    }
    body
}

pub struct TelegramClient {
    client: Client,
    api_base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(API_BASE, token)
    }

    pub fn with_api_base(api_base: &str, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(NewsError::Config("TELEGRAM_BOT_TOKEN is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| NewsError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: format!("{}/bot{}", api_base.trim_end_matches('/'), token.trim()),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{}", self.api_base, method);
        let response: ApiResponse<T> = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| NewsError::Delivery(format!("{method}: {}", e.without_url())))?
            .json()
            .await
            .map_err(|e| NewsError::Delivery(format!("{method}: {}", e.without_url())))?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(NewsError::Delivery(format!(
                "{method}: {}",
                description.unwrap_or_else(|| "request rejected".into())
            ))),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    #[instrument(level = "debug", skip_all, fields(%chat))]
    async fn deliver(&self, chat: ChatId, message: &Outgoing) -> Result<()> {
        let _: Value = self
            .call("sendMessage", &send_message_body(chat, message))
            .await?;
        debug!("Delivered message");
        Ok(())
    }
}

/// Serve updates until the process stops.
pub async fn run_polling(client: Arc<TelegramClient>, handler: Arc<ConversationHandler>) {
    info!("Bot is running...");
    let mut offset = 0i64;
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Polling failed; retrying shortly");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(inbound) = update.into_inbound() else {
                continue;
            };
            if let Some(callback_id) = inbound.callback_id.clone() {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    if let Err(e) = client.answer_callback(&callback_id).await {
                        debug!(error = %e, "Could not acknowledge callback");
                    }
                });
            }
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(inbound.chat, inbound.event).await;
            });
        }
    }
}
