//! Chunk-and-reduce summarization.
//!
//! An article body is split into overlapping chunks (see [`TextSplitter`])
//! and the chunks are stuffed under one fixed instruction template asking for
//! a four-part summary. The stuffed text must fit `max_input_chars`; when it
//! does not, the chunks are first reduced group by group into notes (map) and
//! the notes are stuffed instead (reduce). [`Summarizer::plan`] reports which
//! strategy a chunk sequence needs.
//!
//! Temperature is pinned to zero and every model call is bounded by a
//! timeout, so the same article yields the same summary or a
//! [`NewsError::Summarization`], never a hang.

use crate::api::{Reduce, ReductionRequest};
use crate::error::{NewsError, Result};
use crate::models::{ArticleContent, DocumentChunk, Summary};
use crate::splitter::TextSplitter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const NO_CONTENT_SUMMARY: &str = "No content available for summarization.";
pub const DEFAULT_MAX_INPUT_CHARS: usize = 48_000;
pub const SUMMARY_WORD_BUDGET: usize = 100;

const CHUNK_SEPARATOR: &str = "\n\n";
const MAX_MAP_PASSES: usize = 3;

/// The summary template filled with the article text.
pub fn stuff_prompt(text: &str) -> String {
    format!(
        "Summarize the following article in a concise manner. Focus on the main subject, key facts, and important details. Format the summary as follows:\n\n\
         1. Main Subject: [One sentence describing the primary focus of the article]\n\
         2. Key Facts:\n   \
         - [3-4 bullet points with the most important information]\n\
         3. Context: [1-2 sentences providing relevant background or industry context]\n\
         4. Implications: [1 sentence on potential impact or future outlook]\n\n\
         Keep the entire summary under {SUMMARY_WORD_BUDGET} words.\n\n\
         Article Text:\n```{text}```\n\
         CONCISE SUMMARY:"
    )
}

/// Condenses one group of chunks before the final reduction.
pub fn map_prompt(text: &str) -> String {
    format!(
        "Write concise notes on the following part of an article. Keep every name, number, date and claim; drop repetition and filler.\n\n\
         Article Part:\n```{text}```\n\
         NOTES:"
    )
}

/// How a sequence of chunks will be reduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReductionPlan {
    /// All chunks fit in one call.
    Stuff,
    /// Chunk indices grouped so each group fits in one call.
    MapReduce { groups: Vec<Vec<usize>> },
}

#[derive(Debug, Clone, Copy)]
pub struct SummarizerConfig {
    pub splitter: TextSplitter,
    pub max_input_chars: usize,
    pub timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            splitter: TextSplitter::default(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct Summarizer {
    model: Arc<dyn Reduce>,
    config: SummarizerConfig,
}

fn stuffed_len(texts: &[&str]) -> usize {
    let chars: usize = texts.iter().map(|t| t.chars().count()).sum();
    chars + CHUNK_SEPARATOR.len() * texts.len().saturating_sub(1)
}

fn plan_texts(texts: &[&str], bound: usize) -> ReductionPlan {
    if stuffed_len(texts) <= bound {
        ReductionPlan::Stuff
    } else {
        ReductionPlan::MapReduce {
            groups: group_by_bound(texts, bound),
        }
    }
}

/// Greedily group consecutive texts so each group's stuffed length fits.
fn group_by_bound(texts: &[&str], bound: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_len = 0usize;
    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let added = if current.is_empty() { len } else { len + CHUNK_SEPARATOR.len() };
        if !current.is_empty() && current_len + added > bound {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
            current.push(i);
            current_len += len;
        } else {
            current.push(i);
            current_len += added;
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

impl Summarizer {
    pub fn new(model: Arc<dyn Reduce>, config: SummarizerConfig) -> Result<Self> {
        if config.max_input_chars < config.splitter.max_len() {
            return Err(NewsError::Config(format!(
                "reduction input bound ({}) is smaller than one chunk ({})",
                config.max_input_chars,
                config.splitter.max_len()
            )));
        }
        Ok(Self { model, config })
    }

    pub fn chunks(&self, content: &ArticleContent) -> Vec<DocumentChunk> {
        self.config.splitter.split(&content.body)
    }

    pub fn plan(&self, chunks: &[DocumentChunk]) -> ReductionPlan {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        plan_texts(&texts, self.config.max_input_chars)
    }

    async fn call(&self, prompt: String) -> Result<String> {
        let request = ReductionRequest {
            prompt,
            temperature: 0.0,
        };
        match tokio::time::timeout(self.config.timeout, self.model.reduce(&request)).await {
            Ok(result) => result,
            Err(_) => Err(NewsError::Summarization(format!(
                "reduction timed out after {}ms",
                self.config.timeout.as_millis()
            ))),
        }
    }

    #[instrument(level = "info", skip_all, fields(link = %content.stub.link))]
    pub async fn summarize(&self, content: &ArticleContent) -> Result<Summary> {
        let summary = |text: String| Summary {
            source_link: content.stub.link.clone(),
            title: content.stub.title.clone(),
            text,
        };

        if content.is_missing() {
            info!(title = %content.stub.title, "No content; skipping reduction");
            return Ok(summary(NO_CONTENT_SUMMARY.to_string()));
        }

        let chunks = self.chunks(content);
        for chunk in &chunks {
            debug!(
                chunk = chunk.index,
                offset = chunk.offset,
                overlap = chunk.overlap,
                chars = chunk.text.chars().count(),
                "Prepared chunk"
            );
        }
        let mut plan = self.plan(&chunks);
        let mut texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut passes = 0usize;

        while let ReductionPlan::MapReduce { groups } = plan {
            if passes == MAX_MAP_PASSES {
                return Err(NewsError::Summarization(format!(
                    "article still exceeds {} chars after {MAX_MAP_PASSES} map passes",
                    self.config.max_input_chars
                )));
            }
            passes += 1;
            info!(pass = passes, groups = groups.len(), "Input exceeds bound; mapping chunk groups to notes");

            let mut notes = Vec::with_capacity(groups.len());
            for group in &groups {
                let joined = group
                    .iter()
                    .map(|&i| texts[i].as_str())
                    .collect::<Vec<_>>()
                    .join(CHUNK_SEPARATOR);
                notes.push(self.call(map_prompt(&joined)).await?);
            }
            texts = notes;
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            plan = plan_texts(&refs, self.config.max_input_chars);
        }

        debug!(chunks = chunks.len(), passes, "Stuffing reduction input");
        let text = self.call(stuff_prompt(&texts.join(CHUNK_SEPARATOR))).await?;
        info!(words = text.split_whitespace().count(), "Summarized article");
        Ok(summary(text))
    }
}
