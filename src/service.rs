//! Per-section reads for the display layer
//!
//! `DataService` wires the providers into the orchestrator: one method per
//! dashboard section, each returning `None` when the section is unavailable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::config::TickerInfo;
use crate::data::{Insight, NewsFeed, PriceSeries, RelatedBasket};
use crate::error::UpstreamError;
use crate::fanout::related_basket;
use crate::orchestrator::{FetchOrchestrator, FetchOutcome};
use crate::source::Sources;

/// Everything shown for one ticker
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub ticker: TickerInfo,
    pub price: Option<FetchOutcome<PriceSeries>>,
    pub news: Option<FetchOutcome<NewsFeed>>,
    pub related: Option<FetchOutcome<RelatedBasket>>,
    pub insight: Option<FetchOutcome<Insight>>,
}

/// Reads dashboard sections through the fetch orchestrator
#[derive(Clone)]
pub struct DataService {
    orchestrator: FetchOrchestrator,
    sources: Sources,
    /// Ticker symbol to the symbols of its related basket
    related: HashMap<String, Vec<String>>,
}

impl DataService {
    pub fn new(orchestrator: FetchOrchestrator, sources: Sources, tickers: &[TickerInfo]) -> Self {
        Self {
            orchestrator,
            sources,
            related: tickers
                .iter()
                .map(|t| (t.symbol.clone(), t.related_symbols()))
                .collect(),
        }
    }

    pub async fn price(&self, ticker: &str) -> Option<FetchOutcome<PriceSeries>> {
        self.orchestrator
            .fetch_from(&CacheKey::price(ticker), self.sources.price.as_ref())
            .await
    }

    pub async fn news(&self, ticker: &str) -> Option<FetchOutcome<NewsFeed>> {
        self.orchestrator
            .fetch_from(&CacheKey::news(ticker), self.sources.news.as_ref())
            .await
    }

    /// Quotes for the related basket; `None` when the ticker has no basket
    ///
    /// The basket is cached as a whole. A fetch where every member failed
    /// counts as an upstream failure and falls back to the cached basket.
    pub async fn related(&self, ticker: &str) -> Option<FetchOutcome<RelatedBasket>> {
        let symbols = self.related.get(ticker).filter(|s| !s.is_empty())?;

        let upstream = async {
            let result = related_basket(
                self.sources.quotes.as_ref(),
                self.orchestrator.retry(),
                symbols,
            )
            .await;
            if result.is_empty() {
                Err(UpstreamError::NoData(format!(
                    "{ticker}: 0/{} related quotes",
                    result.total
                )))
            } else {
                Ok(RelatedBasket::from(result))
            }
        };

        self.orchestrator
            .fetch_aggregate(&CacheKey::related(ticker), upstream)
            .await
    }

    /// Cached insight, or a newly generated one when `force` is set
    ///
    /// Price and news are only fetched if an insight is actually generated.
    pub async fn insight(&self, ticker: &str, force: bool) -> Option<FetchOutcome<Insight>> {
        let inputs = async {
            let (price, news) = tokio::join!(self.price(ticker), self.news(ticker));
            Some((price?.payload, news?.payload))
        };
        self.insight_from(ticker, force, inputs).await
    }

    async fn insight_from<P>(
        &self,
        ticker: &str,
        force: bool,
        inputs: P,
    ) -> Option<FetchOutcome<Insight>>
    where
        P: Future<Output = Option<(PriceSeries, NewsFeed)>>,
    {
        let generator = Arc::clone(&self.sources.insight);
        self.orchestrator
            .fetch_regenerable(
                &CacheKey::insight(ticker),
                force,
                inputs,
                |(price, news): (PriceSeries, NewsFeed)| {
                    let generator = Arc::clone(&generator);
                    let ticker = ticker.to_string();
                    async move { generator.generate(&ticker, &price, &news).await }
                },
            )
            .await
    }

    /// Reads every section for one ticker
    ///
    /// Price, news and the related basket are fetched concurrently. The
    /// insight reuses the price and news outcomes instead of fetching again.
    pub async fn dashboard(&self, ticker: &TickerInfo, regenerate_insight: bool) -> Dashboard {
        let symbol = ticker.symbol.as_str();
        let (price, news, related) =
            tokio::join!(self.price(symbol), self.news(symbol), self.related(symbol));

        let inputs = match (&price, &news) {
            (Some(price), Some(news)) => Some((price.payload.clone(), news.payload.clone())),
            _ => None,
        };
        let insight = self
            .insight_from(symbol, regenerate_insight, async { inputs })
            .await;

        Dashboard {
            ticker: ticker.clone(),
            price,
            news,
            related,
            insight,
        }
    }
}
