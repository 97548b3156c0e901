//! # TechCrunch Digest
//!
//! Scrapes TechCrunch category listings, summarizes each article with an
//! OpenAI-compatible model and hands the summaries to a reader.
//!
//! ## Features
//!
//! - Paginated walk over the AI and Startups listings
//! - Chunk-and-reduce summarization with a map-reduce fallback for long articles
//! - Telegram bot with a category menu, page navigation and article summaries
//! - Subscriptions with a periodic broadcast of the newest article per category
//! - Batch mode that logs summaries and optionally writes a JSON digest
//!
//! ## Usage
//!
//! ```sh
//! techcrunch_digest batch --start-page 2 --max-pages 1 --articles-per-page 1
//! techcrunch_digest bot
//! ```
//!
//! ## Architecture
//!
//! 1. **Rendering**: load listing and article pages inside a render session
//! 2. **Extraction**: turn listings into article stubs and articles into text
//! 3. **Summarization**: split, stuff or map-reduce, then reduce to one summary
//! 4. **Delivery**: log and write JSON (batch) or answer chats and broadcast (bot)

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod broadcast;
mod chat;
mod cli;
mod error;
mod models;
mod outputs;
mod pipeline;
mod renderer;
mod retry;
mod scrapers;
mod session;
mod splitter;
mod summarizer;
#[cfg(test)]
mod testing;
mod utils;

use api::OpenAiReducer;
use broadcast::BroadcastScheduler;
use chat::telegram::{self, TelegramClient};
use cli::{BatchArgs, BotArgs, Cli, Command};
use error::NewsError;
use pipeline::{RunRequest, ScrapePipeline};
use renderer::{HttpBrowser, PageRenderer};
use retry::RetryPolicy;
use scrapers::ArticleExtractor;
use session::{ConversationHandler, Subscribers};
use summarizer::{Summarizer, SummarizerConfig};
use utils::ensure_writable_dir;

/// Shared components both subcommands are built from.
struct Components {
    extractor: Arc<ArticleExtractor>,
    summarizer: Arc<Summarizer>,
    pipeline: Arc<ScrapePipeline>,
}

fn build_components(args: &Cli) -> error::Result<Components> {
    let api_key = args
        .openai_api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| NewsError::Config("OPENAI_API_KEY is not set".into()))?;

    let browser = HttpBrowser::new(Duration::from_secs(args.navigation_timeout_secs))?;
    let extractor = Arc::new(ArticleExtractor::new(
        PageRenderer::new(Arc::new(browser)),
        &args.base_url,
    )?);

    let reduction_timeout = Duration::from_secs(args.reduction_timeout_secs);
    let model = OpenAiReducer::new(
        args.openai_api_url.clone(),
        api_key,
        args.openai_model.clone(),
        reduction_timeout,
    );
    let summarizer = Arc::new(Summarizer::new(
        Arc::new(model),
        SummarizerConfig {
            max_input_chars: args.max_input_chars as usize,
            timeout: reduction_timeout,
            ..SummarizerConfig::default()
        },
    )?);

    let retry = RetryPolicy::new(args.run_attempts as usize, Duration::from_secs(1));
    let pipeline = Arc::new(ScrapePipeline::new(
        Arc::clone(&extractor),
        Arc::clone(&summarizer),
        retry,
    ));

    Ok(Components {
        extractor,
        summarizer,
        pipeline,
    })
}

#[instrument(level = "info", skip_all, fields(category = %args.category))]
async fn run_batch(components: Components, args: &BatchArgs) -> error::Result<()> {
    // Early check: ensure JSON output dir is writable
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let request = RunRequest::new(
        args.category,
        args.start_page,
        args.max_pages,
        args.articles_per_page as usize,
    );
    let summaries = components.pipeline.run_with_retry(request).await?;
    outputs::log_summaries(&summaries);

    if let Some(dir) = &args.json_output_dir {
        let digest = outputs::json::digest(args.category, summaries);
        outputs::json::write_digest(&digest, dir).await?;
    }
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_bot(components: Components, args: &BotArgs) -> error::Result<()> {
    let client = Arc::new(TelegramClient::new(&args.telegram_bot_token)?);
    let subscribers = Subscribers::default();
    let interval = Duration::from_secs(args.broadcast_interval_secs);

    let handler = Arc::new(ConversationHandler::new(
        components.extractor,
        components.summarizer,
        subscribers.clone(),
        client.clone(),
        interval,
    ));
    let scheduler = Arc::new(BroadcastScheduler::new(
        components.pipeline,
        subscribers,
        client.clone(),
        interval,
    ));
    let broadcasts = scheduler.spawn();

    telegram::run_polling(client, handler).await;
    broadcasts.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("techcrunch_digest starting up");

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }
    let args = Cli::parse();
    debug!(base_url = %args.base_url, model = %args.openai_model, "Parsed CLI arguments");

    let components = build_components(&args)?;
    let outcome = match &args.command {
        Command::Batch(batch) => run_batch(components, batch).await,
        Command::Bot(bot) => run_bot(components, bot).await,
    };
    if let Err(e) = outcome {
        error!(error = %e, "An error occurred");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
