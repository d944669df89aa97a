//! Per-URL processing
//!
//! Each URL of an inbound message gets its own task:
//! 1. Quota check (rejection is replied to directly, the pool is never used)
//! 2. Initial "queued" status
//! 3. Adapter selection (no match fails at once, without retry)
//! 4. Retried unit: extraction inside the pool, then sequential downloads
//! 5. Size-based grouping and a single terminal event
//!
//! A separate delivery task consumes the progress channel and turns events
//! into messenger calls. The processing task waits for it to acknowledge the
//! terminal event before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use browser_pool::{AutomationResource, ResourcePool};
use media_adapter::{AdapterRegistry, MediaAdapter, MediaKind};
use quota::{Feature, QuotaGuard};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::context::{ProcessingContext, extract_urls};
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::media::{Grouping, MediaItem, group_media, total_size};
use crate::messenger::{ChatRef, MessageRef, Messenger};
use crate::progress::{
    Outcome, ProgressEvent, ProgressReceiver, ProgressSender, progress_channel,
};
use crate::retry::RetryPolicy;
use crate::status;

/// Pipeline settings, built once from configuration and passed down.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    /// Maximum cumulative bytes per delivery group.
    pub max_group_size: u64,
    pub request_timeout: Duration,
    /// Overrides the adapter's user agent for downloads when set.
    pub user_agent: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_group_size: 50 * 1024 * 1024,
            request_timeout: Duration::from_secs(120),
            user_agent: None,
        }
    }
}

/// How a URL's processing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    Delivered,
    Failed,
    /// Refused by the quota check.
    Rejected,
}

impl UrlOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            UrlOutcome::Delivered => "delivered",
            UrlOutcome::Failed => "failed",
            UrlOutcome::Rejected => "rejected",
        }
    }
}

pub struct Processor<R: AutomationResource> {
    pool: Arc<ResourcePool<R>>,
    adapters: Arc<AdapterRegistry<R>>,
    quota: Arc<QuotaGuard>,
    messenger: Arc<dyn Messenger>,
    downloader: Downloader,
    config: PipelineConfig,
    /// Every URL task spawned by `handle_message`, awaited by `drain`.
    tasks: TaskTracker,
}

impl<R: AutomationResource> Processor<R> {
    pub fn new(
        pool: Arc<ResourcePool<R>>,
        adapters: Arc<AdapterRegistry<R>>,
        quota: Arc<QuotaGuard>,
        messenger: Arc<dyn Messenger>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let downloader = Downloader::new(config.request_timeout)?;
        Ok(Self {
            pool,
            adapters,
            quota,
            messenger,
            downloader,
            config,
            tasks: TaskTracker::new(),
        })
    }

    pub fn pool(&self) -> &Arc<ResourcePool<R>> {
        &self.pool
    }

    /// Spawn one processing task per URL line in `text`.
    ///
    /// Returns the task handles in URL order; empty when `text` has no URL.
    pub fn handle_message(
        self: &Arc<Self>,
        account_id: i64,
        chat: ChatRef,
        text: &str,
    ) -> Vec<JoinHandle<UrlOutcome>> {
        let urls = extract_urls(text);
        info!(
            account_id,
            chat_id = chat.chat_id,
            urls = urls.len(),
            "inbound message"
        );
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| {
                let ctx = ProcessingContext::new(account_id, chat.clone(), index, url);
                self.tasks.spawn(self.clone().process_url(ctx))
            })
            .collect()
    }

    /// Number of URL tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `timeout` for every spawned URL task to reach its terminal
    /// event. Returns false when tasks were still running at the deadline.
    ///
    /// Tasks spawned after this call are still tracked and awaited.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok();
        if drained {
            info!("all url tasks finished");
        } else {
            warn!(remaining = self.tasks.len(), "url tasks still running at drain deadline");
        }
        drained
    }

    #[instrument(skip_all, fields(chat_id = ctx.chat.chat_id, index = ctx.index, url = %ctx.url))]
    pub async fn process_url(self: Arc<Self>, mut ctx: ProcessingContext) -> UrlOutcome {
        let started = Instant::now();

        if let Err(e) = self
            .quota
            .check_and_increment(ctx.account_id, Feature::GetMedia, 1)
            .await
        {
            warn!(account_id = ctx.account_id, error = %e, "account is not allowed to download");
            let notice = status::quota_rejection(&e.to_string());
            if let Err(send_err) = self.messenger.send_reply(&ctx.chat, &notice).await {
                error!(error = %send_err, "failed to send quota rejection");
            }
            return record(UrlOutcome::Rejected, started);
        }

        let queued = status::status_text(ctx.index, &ctx.url, status::QUEUED);
        let status_msg = match self.messenger.send_status(&ctx.chat, &queued).await {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "failed to send initial status");
                return record(UrlOutcome::Failed, started);
            }
        };
        ctx.status = Some(status_msg.clone());

        let (progress, events) = progress_channel();
        let consumer = tokio::spawn(
            deliver(self.messenger.clone(), ctx.clone(), status_msg, events).in_current_span(),
        );

        let outcome = self.resolve(&ctx, &progress).await;
        let delivered = progress.finish(outcome).await;
        if let Err(e) = consumer.await {
            error!(error = %e, "delivery task failed");
        }

        record(
            if delivered {
                UrlOutcome::Delivered
            } else {
                UrlOutcome::Failed
            },
            started,
        )
    }

    /// Select the adapter and run the retried extraction + download unit.
    async fn resolve(&self, ctx: &ProcessingContext, progress: &ProgressSender) -> Outcome {
        let adapter = match self.adapters.select(&ctx.url) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(error = %e, "no adapter for url");
                return Outcome::Failed {
                    state: e.to_string(),
                };
            }
        };
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| adapter.user_agent().to_string());
        debug!(adapter = adapter.name(), "adapter selected");

        let result = self
            .config
            .retry
            .run(
                |attempt| self.attempt(adapter.clone(), ctx, progress, &user_agent, attempt),
                Error::is_retryable,
            )
            .await;

        match result {
            Ok(items) => {
                let count = items.len();
                let total = total_size(&items);
                progress.state(status::sending(total)).await;
                info!(count, total_bytes = total, "media downloaded");
                Outcome::Delivered {
                    grouping: group_media(items, self.config.max_group_size),
                    state: status::success(count, total),
                }
            }
            Err(e) => {
                error!(attempts = e.attempts(), error = %e, "processing failed");
                Outcome::Failed {
                    state: e.to_string(),
                }
            }
        }
    }

    /// One attempt: extract direct URLs on a pool resource, then download each.
    async fn attempt(
        &self,
        adapter: Arc<dyn MediaAdapter<R>>,
        ctx: &ProcessingContext,
        progress: &ProgressSender,
        user_agent: &str,
        attempt: u32,
    ) -> Result<Vec<MediaItem>> {
        debug!(attempt, "starting attempt");
        progress.state(status::GETTING_INFO).await;

        let extractor = adapter.clone();
        let url = ctx.url.clone();
        let direct_urls = self
            .pool
            .use_resource(move |exec, resource: &mut R| {
                Box::pin(async move { extractor.extract_direct_urls(&exec, resource, &url).await })
            })
            .await??;
        if direct_urls.is_empty() {
            return Err(media_adapter::AdapterError::NoMedia(ctx.url.clone()).into());
        }

        let total = direct_urls.len();
        let mut items = Vec::with_capacity(total);
        for (i, direct_url) in direct_urls.iter().enumerate() {
            let probed = self.downloader.probe_size(direct_url, user_agent).await;
            progress
                .state(status::downloading(i + 1, total, probed))
                .await;

            let download = self.downloader.fetch(direct_url, user_agent).await?;
            let size = if probed > 0 {
                probed
            } else {
                download.content_length
            };
            let mut filename = adapter.build_filename(&ctx.url, direct_url, i);
            if MediaKind::from_filename(&filename) == MediaKind::Unknown
                && let Some(served) = download.filename
            {
                filename = served;
            }
            items.push(MediaItem::new(filename, size, direct_url.clone(), download.stream));
        }
        Ok(items)
    }
}

/// Consume progress events for one URL until the terminal event.
async fn deliver(
    messenger: Arc<dyn Messenger>,
    ctx: ProcessingContext,
    status_msg: MessageRef,
    mut events: ProgressReceiver,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::State(state) => {
                edit_status(messenger.as_ref(), &ctx, &status_msg, &state).await;
            }
            ProgressEvent::Finished { outcome, ack } => {
                let delivered = match outcome {
                    Outcome::Failed { state } => {
                        edit_status(messenger.as_ref(), &ctx, &status_msg, &state).await;
                        false
                    }
                    Outcome::Delivered { grouping, state } => {
                        send_grouping(messenger.as_ref(), &ctx, &status_msg, grouping, &state)
                            .await
                    }
                };
                ack.done(delivered);
            }
        }
    }
}

async fn send_grouping(
    messenger: &dyn Messenger,
    ctx: &ProcessingContext,
    status_msg: &MessageRef,
    grouping: Grouping,
    state: &str,
) -> bool {
    let Grouping { groups, oversized } = grouping;

    for entry in oversized {
        let notice = status::oversized_notice(
            ctx.index,
            &ctx.url,
            entry.position,
            entry.item.size,
            &entry.item.direct_url,
        );
        if let Err(e) = messenger.send_reply(&ctx.chat, &notice).await {
            error!(error = %e, "failed to send direct url notice");
        }
    }

    let caption = status::status_text(ctx.index, &ctx.url, state);
    let mut failure = None;
    for group in groups {
        // Once a group fails, the remaining groups are dropped, closing their streams.
        if failure.is_some() {
            continue;
        }
        if let Err(e) = messenger.send_media_batch(&ctx.chat, group, &caption).await {
            error!(error = %e, "failed to send media group");
            failure = Some(e);
        }
    }

    match failure {
        None => {
            if let Err(e) = messenger.delete_status(status_msg).await {
                error!(error = %e, "failed to delete status message");
            }
            true
        }
        Some(e) => {
            let state = status::delivery_failed(&e.to_string());
            edit_status(messenger, ctx, status_msg, &state).await;
            false
        }
    }
}

async fn edit_status(
    messenger: &dyn Messenger,
    ctx: &ProcessingContext,
    status_msg: &MessageRef,
    state: &str,
) {
    let text = status::status_text(ctx.index, &ctx.url, state);
    if let Err(e) = messenger.edit_status(status_msg, &text).await {
        error!(error = %e, "failed to edit status message");
    }
}

fn record(outcome: UrlOutcome, started: Instant) -> UrlOutcome {
    metrics::counter!("media_requests_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("media_request_duration_seconds").record(started.elapsed().as_secs_f64());
    info!(
        outcome = outcome.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "url processing finished"
    );
    outcome
}
