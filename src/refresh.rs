//! Background cache refresh
//!
//! `RefreshJob` forces an upstream fetch of every data kind for every tracked
//! ticker and writes each success into the cache, whatever its freshness. In
//! background-refresh-only deployments it is the only producer of fresh data.
//! `RefreshHandle` drives the job on an interval and reports progress over a
//! tokio channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::{Config, TickerInfo};
use crate::data::RelatedBasket;
use crate::error::UpstreamError;
use crate::fanout::related_basket;
use crate::retry::RetryExecutor;
use crate::source::Sources;

/// What happened to the insight of a ticker during one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightStatus {
    Generated,
    Failed,
    /// Price or news was missing, so nothing was attempted
    Skipped,
}

/// Outcome of refreshing one ticker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerReport {
    pub ticker: String,
    pub price: bool,
    pub news: bool,
    pub related_successful: usize,
    pub related_total: usize,
    pub insight: InsightStatus,
}

impl TickerReport {
    /// True when every data kind was refreshed
    pub fn is_complete(&self) -> bool {
        self.price
            && self.news
            && self.related_successful == self.related_total
            && self.insight == InsightStatus::Generated
    }
}

/// Outcome of one full cycle
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub reports: Vec<TickerReport>,
    pub elapsed: Duration,
}

impl RefreshSummary {
    pub fn complete_tickers(&self) -> usize {
        self.reports.iter().filter(|r| r.is_complete()).count()
    }
}

/// Forces upstream fetches for all tracked tickers
#[derive(Clone)]
pub struct RefreshJob {
    store: CacheStore,
    retry: RetryExecutor,
    sources: Sources,
    tickers: Vec<TickerInfo>,
}

impl RefreshJob {
    pub fn new(
        store: CacheStore,
        retry: RetryExecutor,
        sources: Sources,
        tickers: Vec<TickerInfo>,
    ) -> Self {
        Self {
            store,
            retry,
            sources,
            tickers,
        }
    }

    pub fn from_config(config: &Config, sources: Sources) -> Self {
        Self::new(
            config.cache_store(),
            config.retry_executor(),
            sources,
            config.tickers.clone(),
        )
    }

    /// Runs one cycle over every ticker concurrently
    ///
    /// Failures are logged per ticker and per kind; the cycle itself always
    /// completes.
    pub async fn run_once(&self) -> RefreshSummary {
        let started = Instant::now();
        info!(tickers = self.tickers.len(), "starting background refresh");

        let reports = join_all(self.tickers.iter().map(|t| self.refresh_ticker(t))).await;

        let summary = RefreshSummary {
            reports,
            elapsed: started.elapsed(),
        };
        info!(
            complete = summary.complete_tickers(),
            total = summary.reports.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "background refresh complete"
        );
        summary
    }

    /// Refreshes price, news, related basket and, when possible, the insight
    pub async fn refresh_ticker(&self, ticker: &TickerInfo) -> TickerReport {
        let symbol = ticker.symbol.as_str();
        let related_symbols = ticker.related_symbols();
        let price_key = CacheKey::price(symbol);
        let news_key = CacheKey::news(symbol);
        let price_label = price_key.to_string();
        let news_label = news_key.to_string();

        info!(ticker = symbol, "refreshing ticker");

        let (price, news, related) = tokio::join!(
            self.retry
                .run(&price_label, || self.sources.price.fetch(symbol)),
            self.retry
                .run(&news_label, || self.sources.news.fetch(symbol)),
            related_basket(self.sources.quotes.as_ref(), &self.retry, &related_symbols),
        );

        let price = self.store_result(&price_key, price);
        let news = self.store_result(&news_key, news);

        let related_successful = related.successful();
        let related_total = related.total;
        if related.is_empty() {
            if related_total > 0 {
                error!(ticker = symbol, "related quotes failed for every member");
            }
        } else {
            let basket = RelatedBasket::from(related);
            self.write(&CacheKey::related(symbol), &basket);
        }

        let insight = match (&price, &news) {
            (Some(price), Some(news)) => {
                let key = CacheKey::insight(symbol);
                let label = key.to_string();
                let generated = self
                    .retry
                    .run(&label, || self.sources.insight.generate(symbol, price, news))
                    .await;
                match generated {
                    Ok(insight) => {
                        self.write(&key, &insight);
                        InsightStatus::Generated
                    }
                    Err(err) => {
                        error!(ticker = symbol, error = %err, "insight generation failed");
                        InsightStatus::Failed
                    }
                }
            }
            _ => {
                warn!(ticker = symbol, "skipping insight, price or news missing");
                InsightStatus::Skipped
            }
        };

        TickerReport {
            ticker: symbol.to_string(),
            price: price.is_some(),
            news: news.is_some(),
            related_successful,
            related_total,
            insight,
        }
    }

    /// Writes a successful fetch; a failed fetch is logged and dropped
    fn store_result<T: Serialize>(
        &self,
        key: &CacheKey,
        result: Result<T, UpstreamError>,
    ) -> Option<T> {
        match result {
            Ok(payload) => {
                self.write(key, &payload);
                Some(payload)
            }
            Err(err) => {
                error!(key = %key, error = %err, "refresh fetch failed");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &CacheKey, payload: &T) {
        match self.store.set(key, payload) {
            Ok(()) => info!(key = %key, "refreshed"),
            Err(err) => error!(key = %key, error = %err, "failed to write refreshed data"),
        }
    }
}

/// Messages sent from the background refresh task
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// A cycle is starting
    CycleStarted { cycle: u64 },
    /// One ticker finished within the current cycle
    TickerRefreshed(TickerReport),
    /// The cycle finished
    CycleCompleted { cycle: u64, summary: RefreshSummary },
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Spawns a task that runs `job` immediately and then every `interval`
    ///
    /// A shutdown request is honoured between cycles; a running cycle is
    /// never interrupted.
    pub fn spawn(job: Arc<RefreshJob>, interval: Duration) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cycle = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cycle += 1;
                        let _ = msg_tx.send(RefreshMessage::CycleStarted { cycle }).await;

                        let summary = job.run_once().await;
                        for report in &summary.reports {
                            let message = RefreshMessage::TickerRefreshed(report.clone());
                            let _ = msg_tx.send(message).await;
                        }
                        let message = RefreshMessage::CycleCompleted { cycle, summary };
                        let _ = msg_tx.send(message).await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            receiver: msg_rx,
            shutdown_tx,
            task,
        }
    }

    /// Stops the task after the current cycle and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        drop(self.receiver);
        let _ = self.task.await;
    }
}
