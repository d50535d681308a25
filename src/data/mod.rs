//! Payload types and upstream provider clients
//!
//! Every data kind has its own typed payload. Provider responses are parsed
//! and validated inside the clients, so everything downstream (cache,
//! orchestrator, display) only ever sees these types.

pub mod insight;
pub mod news;
pub mod polygon;

pub use insight::OpenAiClient;
pub use news::NewsClient;
pub use polygon::PolygonClient;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// One daily bar of a price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Roughly one month of daily bars for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub prices: Vec<PricePoint>,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    /// Lower bound of the chart axis, with a buffer below the lowest close
    pub price_range_min: Option<f64>,
    /// Upper bound of the chart axis, with a buffer above the highest close
    pub price_range_max: Option<f64>,
}

impl PriceSeries {
    /// Day-over-day change in percent, if both closes are known
    pub fn change_pct(&self) -> Option<f64> {
        let current = self.current_price?;
        let previous = self.previous_close?;
        if previous == 0.0 {
            return None;
        }
        Some((current - previous) / previous * 100.0)
    }
}

/// A single news article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub source_title: Option<String>,
    /// Publication date as reported by the provider (ISO-8601, sorts lexically)
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub article_link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Recent articles for a ticker, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub ticker: String,
    pub articles: Vec<Article>,
}

/// AI-generated commentary for a ticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub ticker: String,
    pub insight: String,
    pub tokens_used: u32,
}

/// Latest close and daily move of a related ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedQuote {
    pub current: f64,
    pub change: f64,
    pub change_pct: f64,
}

/// Quotes for the related basket of one tracked ticker
///
/// Only tickers that were fetched successfully appear in `quotes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelatedBasket {
    pub quotes: BTreeMap<String, RelatedQuote>,
}

impl RelatedBasket {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }
}

/// Turns a non-success response into a classified error, keeping the body as context
pub(crate) async fn checked(
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(200).collect();
    Err(UpstreamError::from_status(status, message))
}
