//! Boundaries to the upstream providers
//!
//! The orchestrator and refresh job only talk to providers through these
//! traits, which keeps them testable with in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::data::{
    Insight, NewsClient, NewsFeed, OpenAiClient, PolygonClient, PriceSeries, RelatedQuote,
};
use crate::error::UpstreamError;

/// Fetches one payload of type `T` per logical identifier
///
/// Implementations must be safe to call concurrently for different
/// identifiers and report failures already classified.
#[async_trait]
pub trait SourceAdapter<T: Send + 'static>: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<T, UpstreamError>;
}

/// Produces commentary from already-fetched price and news data
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(
        &self,
        ticker: &str,
        price: &PriceSeries,
        news: &NewsFeed,
    ) -> Result<Insight, UpstreamError>;
}

/// The set of providers a deployment talks to
#[derive(Clone)]
pub struct Sources {
    pub price: Arc<dyn SourceAdapter<PriceSeries>>,
    pub news: Arc<dyn SourceAdapter<NewsFeed>>,
    pub quotes: Arc<dyn SourceAdapter<RelatedQuote>>,
    pub insight: Arc<dyn InsightGenerator>,
}

impl Sources {
    /// The production providers: Polygon for prices and quotes, NewsDataHub, OpenAI
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let polygon = Arc::new(PolygonClient::new(
            config.api_keys.polygon.clone(),
            config.request_timeout,
        )?);
        let openai = OpenAiClient::new(config.api_keys.openai.clone(), config.request_timeout)?;

        Ok(Self {
            price: polygon.clone(),
            news: Arc::new(NewsClient::from_config(config)?),
            quotes: polygon,
            insight: Arc::new(openai),
        })
    }
}
