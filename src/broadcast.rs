//! Periodic fan-out of the newest article of each category.
//!
//! Every tick runs the pipeline for the single newest article of each
//! tracked category, concurrently across categories. A category that yields
//! nothing, or fails, is skipped for that tick. The subscriber set is read
//! once the summary is ready, so a chat subscribing mid-tick may or may not
//! receive it. Deliveries are independent: one failing chat is logged and
//! the others still receive the message.

use crate::chat::{ChatTransport, Outgoing};
use crate::models::Category;
use crate::pipeline::{RunRequest, ScrapePipeline};
use crate::session::Subscribers;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, instrument, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
const PARALLEL_DELIVERIES: usize = 16;

/// What one tick did for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Delivered { delivered: usize, failed: usize },
    NoArticles,
    PipelineFailed,
}

pub struct BroadcastScheduler {
    pipeline: Arc<ScrapePipeline>,
    subscribers: Subscribers,
    transport: Arc<dyn ChatTransport>,
    categories: Vec<Category>,
    interval: Duration,
}

impl BroadcastScheduler {
    pub fn new(
        pipeline: Arc<ScrapePipeline>,
        subscribers: Subscribers,
        transport: Arc<dyn ChatTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            subscribers,
            transport,
            categories: Category::ALL.to_vec(),
            interval,
        }
    }

    /// Run one tick over every tracked category.
    #[instrument(level = "info", skip(self))]
    pub async fn tick(&self) -> Vec<(Category, CategoryOutcome)> {
        info!("Running auto-fetch task...");
        let outcomes = join_all(self.categories.iter().map(|&category| async move {
            (category, self.broadcast_category(category).await)
        }))
        .await;
        info!(?outcomes, "Broadcast tick finished");
        outcomes
    }

    async fn broadcast_category(&self, category: Category) -> CategoryOutcome {
        let summaries = match self.pipeline.run(RunRequest::latest(category)).await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!(%category, error = %e, "Error fetching latest news");
                return CategoryOutcome::PipelineFailed;
            }
        };
        let Some(summary) = summaries.into_iter().next() else {
            info!(%category, "No article to broadcast");
            return CategoryOutcome::NoArticles;
        };

        let message = Outgoing::Text(summary.to_broadcast_message(category));
        let recipients = self.subscribers.snapshot().await;
        let results: Vec<bool> = stream::iter(recipients)
            .map(|chat| {
                let message = &message;
                async move {
                    match self.transport.deliver(chat, message).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(%chat, %category, error = %e, "Broadcast delivery failed");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(PARALLEL_DELIVERIES)
            .collect()
            .await;

        let delivered = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - delivered;
        info!(%category, delivered, failed, "Broadcast delivered");
        CategoryOutcome::Delivered { delivered, failed }
    }

    /// Tick every `interval`, starting one interval from now.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Broadcast scheduler started");
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
