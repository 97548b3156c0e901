//! Command-line interface definitions for TechCrunch Digest.
//!
//! Every option can be given as a flag or through the environment; a `.env`
//! file in the working directory is loaded before parsing.

use crate::broadcast::DEFAULT_INTERVAL;
use crate::models::Category;
use crate::retry::DEFAULT_ATTEMPTS;
use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the TechCrunch Digest application.
///
/// # Examples
///
/// ```sh
/// # One batch run over pages 2..=3 of the startups listing
/// techcrunch_digest batch --start-page 2 --max-pages 2 --articles-per-page 3
///
/// # Batch run that also writes a JSON digest
/// techcrunch_digest batch --category ai -j ./json
///
/// # Interactive bot with the 4-hour broadcast
/// TELEGRAM_BOT_TOKEN=... techcrunch_digest bot
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Site root the category listings are resolved against
    #[arg(long, env = "NEWS_BASE_URL", default_value = "https://techcrunch.com", global = true)]
    pub base_url: String,

    /// API key for the OpenAI-compatible completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// Chat completions endpoint
    #[arg(
        long,
        env = "OPENAI_API_URL",
        default_value = "https://api.openai.com/v1/chat/completions",
        global = true
    )]
    pub openai_api_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini", global = true)]
    pub openai_model: String,

    /// Upper bound on a single page load, in seconds
    #[arg(long, env = "NAVIGATION_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub navigation_timeout_secs: u64,

    /// Upper bound on a single model call, in seconds
    #[arg(long, env = "REDUCTION_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub reduction_timeout_secs: u64,

    /// Largest text handed to the model in one call before falling back to map-reduce
    #[arg(
        long,
        env = "MAX_REDUCTION_INPUT_CHARS",
        default_value_t = 48_000,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub max_input_chars: u64,

    /// Attempts per pipeline run before giving up
    #[arg(
        long,
        env = "RUN_ATTEMPTS",
        default_value_t = DEFAULT_ATTEMPTS as u64,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub run_attempts: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape and summarize one range of listing pages, then exit
    Batch(BatchArgs),
    /// Serve the chat bot and the periodic broadcast
    Bot(BotArgs),
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[arg(long, value_enum, default_value_t = Category::Startups)]
    pub category: Category,

    /// First listing page to read (1-based)
    #[arg(long, env = "START_PAGE", default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub start_page: u32,

    /// Number of consecutive pages to read
    #[arg(long, env = "MAX_PAGES", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: u32,

    #[arg(long, env = "ARTICLES_PER_PAGE", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub articles_per_page: u32,

    /// Output directory for the JSON digest
    #[arg(short, long)]
    pub json_output_dir: Option<String>,
}

#[derive(Args, Debug)]
pub struct BotArgs {
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: String,

    /// Seconds between two broadcast ticks
    #[arg(
        long,
        env = "BROADCAST_INTERVAL_SECS",
        default_value_t = DEFAULT_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub broadcast_interval_secs: u64,
}
