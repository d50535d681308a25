//! In-memory providers and setup shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use findash::config::{Config, DeploymentMode, RetrySettings};
use findash::data::{Article, Insight, NewsFeed, PriceSeries, RelatedQuote};
use findash::error::UpstreamError;
use findash::orchestrator::FetchOrchestrator;
use findash::refresh::RefreshJob;
use findash::service::DataService;
use findash::source::{InsightGenerator, SourceAdapter, Sources};

/// Adapter that returns the same result for every identifier and counts calls
///
/// Identifiers listed in `failing_for` get a transient error instead.
pub struct Fake<T> {
    calls: AtomicUsize,
    result: Result<T, UpstreamError>,
    failing_for: Vec<String>,
}

impl<T> Fake<T> {
    pub fn ok(payload: T) -> Arc<Self> {
        Self::ok_except(payload, &[])
    }

    pub fn ok_except(payload: T, failing_for: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result: Ok(payload),
            failing_for: failing_for.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn failing(err: UpstreamError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result: Err(err),
            failing_for: Vec::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> SourceAdapter<T> for Fake<T> {
    async fn fetch(&self, identifier: &str) -> Result<T, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_for.iter().any(|s| s == identifier) {
            return Err(UpstreamError::Transient(format!("{identifier} unavailable")));
        }
        self.result.clone()
    }
}

/// Quote provider where some symbols always fail with a transient error
pub struct FakeQuotes {
    calls: AtomicUsize,
    failing: Vec<String>,
}

impl FakeQuotes {
    pub fn new(failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter<RelatedQuote> for FakeQuotes {
    async fn fetch(&self, identifier: &str) -> Result<RelatedQuote, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|s| s == identifier) {
            return Err(UpstreamError::Transient(format!("{identifier} unavailable")));
        }
        Ok(RelatedQuote {
            current: 100.0,
            change: 1.0,
            change_pct: 1.0,
        })
    }
}

/// Insight generator that echoes the price it was given
pub struct FakeInsight {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeInsight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InsightGenerator for FakeInsight {
    async fn generate(
        &self,
        ticker: &str,
        price: &PriceSeries,
        _news: &NewsFeed,
    ) -> Result<Insight, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(UpstreamError::Transient("model overloaded".to_string()));
        }
        Ok(Insight {
            ticker: ticker.to_string(),
            insight: format!("{ticker} trades at {:?} (#{n})", price.current_price),
            tokens_used: 42,
        })
    }
}

pub fn price_series(ticker: &str, current: f64) -> PriceSeries {
    PriceSeries {
        ticker: ticker.to_string(),
        prices: Vec::new(),
        current_price: Some(current),
        previous_close: Some(current - 1.0),
        price_range_min: None,
        price_range_max: None,
    }
}

pub fn news_feed(ticker: &str) -> NewsFeed {
    NewsFeed {
        ticker: ticker.to_string(),
        articles: vec![Article {
            title: format!("{ticker} beats estimates"),
            source_title: Some("Reuters".to_string()),
            pub_date: Some("2025-01-02T10:00:00Z".to_string()),
            article_link: None,
            description: None,
        }],
    }
}

/// A temporary cache directory plus counting fakes for every provider
pub struct Harness {
    pub dir: TempDir,
    pub prices: Arc<Fake<PriceSeries>>,
    pub news: Arc<Fake<NewsFeed>>,
    pub quotes: Arc<FakeQuotes>,
    pub insight: Arc<FakeInsight>,
}

impl Harness {
    pub fn healthy() -> Self {
        Self::with(
            Fake::ok(price_series("NFLX", 100.0)),
            Fake::ok(news_feed("NFLX")),
            FakeQuotes::new(&[]),
            FakeInsight::new(),
        )
    }

    pub fn with(
        prices: Arc<Fake<PriceSeries>>,
        news: Arc<Fake<NewsFeed>>,
        quotes: Arc<FakeQuotes>,
        insight: Arc<FakeInsight>,
    ) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            prices,
            news,
            quotes,
            insight,
        }
    }

    pub fn sources(&self) -> Sources {
        Sources {
            price: self.prices.clone(),
            news: self.news.clone(),
            quotes: self.quotes.clone(),
            insight: self.insight.clone(),
        }
    }

    /// Default configuration with millisecond backoffs and two retries
    pub fn config(&self, mode: DeploymentMode) -> Config {
        let mut config = Config::new(self.dir.path().to_path_buf());
        config.mode = mode;
        config.retry = RetrySettings {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
            rate_limit_unit: Duration::from_millis(1),
        };
        config
    }

    pub fn service(&self, mode: DeploymentMode) -> DataService {
        let config = self.config(mode);
        DataService::new(
            FetchOrchestrator::from_config(&config),
            self.sources(),
            &config.tickers,
        )
    }

    pub fn job(&self) -> RefreshJob {
        RefreshJob::from_config(&self.config(DeploymentMode::Interactive), self.sources())
    }
}
