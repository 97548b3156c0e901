//! Language-model reduction over an OpenAI-compatible chat API.
//!
//! # Architecture
//!
//! - [`Reduce`]: the capability "turn this prompt into bounded text"
//! - [`OpenAiReducer`]: [`Reduce`] over a chat-completions endpoint
//!
//! Every call is bounded by a timeout. A timeout, a transport error, an error
//! status or an empty completion all surface as
//! [`NewsError::Summarization`]; retrying is left to the run-level policy.

use crate::error::{NewsError, Result};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// One reduction call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionRequest {
    pub prompt: String,
    /// Pinned to zero by the summarizer so output is reproducible.
    pub temperature: f32,
}

/// Trait for async language-model reduction.
#[async_trait]
pub trait Reduce: Send + Sync {
    async fn reduce(&self, request: &ReductionRequest) -> Result<String>;
}

/// [`Reduce`] backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiReducer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl fmt::Debug for OpenAiReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiReducer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiReducer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn completion_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| NewsError::Summarization("model returned an empty completion".into()))
}

#[async_trait]
impl Reduce for OpenAiReducer {
    #[instrument(level = "info", skip_all, fields(model = %self.model, prompt_chars = request.prompt.len()))]
    async fn reduce(&self, request: &ReductionRequest) -> Result<String> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let call = async {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| NewsError::Summarization(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(NewsError::Summarization(format!(
                    "API error {status}: {}",
                    truncate_for_log(&text, 300)
                )));
            }
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| NewsError::Summarization(format!("malformed response: {e}")))?;
            completion_text(parsed)
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(NewsError::Summarization(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        };

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => debug!(elapsed_ms, preview = %truncate_for_log(text, 200), "Reduction succeeded"),
            Err(e) => warn!(elapsed_ms, error = %e, "Reduction failed"),
        }
        result
    }
}
