//! Polygon.io aggregates client
//!
//! Fetches daily bars and turns them into a `PriceSeries` for tracked tickers
//! or a `RelatedQuote` for members of a related basket.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{checked, PricePoint, PriceSeries, RelatedQuote};
use crate::error::UpstreamError;
use crate::source::SourceAdapter;

/// Base URL for the Polygon API
const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Days of history shown on the price chart
const PRICE_HISTORY_DAYS: i64 = 30;

/// Window for related quotes; wide enough to span a weekend
const QUOTE_WINDOW_DAYS: i64 = 5;

/// Share of the price range added above and below the chart axis
const PRICE_CHART_BUFFER_PCT: f64 = 0.10;

/// Aggregates endpoint response
#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Vec<AggregateBar>,
}

/// A single daily bar as Polygon reports it
#[derive(Debug, Clone, Deserialize)]
struct AggregateBar {
    /// Start of the bar, milliseconds since the epoch
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

/// Client for the Polygon aggregates API
#[derive(Debug, Clone)]
pub struct PolygonClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PolygonClient {
    /// Creates a client whose requests time out after `timeout`
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            base_url: POLYGON_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn aggregates(
        &self,
        ticker: &str,
        days: i64,
        sort: &str,
    ) -> Result<AggregatesResponse, UpstreamError> {
        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(days);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            ticker,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", sort),
            ])
            .send()
            .await?;
        let text = checked(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fetches about one month of daily bars, oldest first
    pub async fn fetch_price_series(&self, ticker: &str) -> Result<PriceSeries, UpstreamError> {
        let started = Instant::now();
        let response = self.aggregates(ticker, PRICE_HISTORY_DAYS, "asc").await?;

        info!(
            ticker,
            elapsed_ms = started.elapsed().as_millis() as u64,
            data_points = response.results.len(),
            "polygon price series fetched"
        );

        Ok(to_price_series(ticker, &response.results))
    }

    /// Fetches the latest close and daily change for one ticker
    pub async fn fetch_quote(&self, ticker: &str) -> Result<RelatedQuote, UpstreamError> {
        let response = self.aggregates(ticker, QUOTE_WINDOW_DAYS, "desc").await?;
        to_quote(ticker, &response.results)
    }
}

#[async_trait]
impl SourceAdapter<PriceSeries> for PolygonClient {
    async fn fetch(&self, identifier: &str) -> Result<PriceSeries, UpstreamError> {
        self.fetch_price_series(identifier).await
    }
}

#[async_trait]
impl SourceAdapter<RelatedQuote> for PolygonClient {
    async fn fetch(&self, identifier: &str) -> Result<RelatedQuote, UpstreamError> {
        self.fetch_quote(identifier).await
    }
}

/// Builds a series from bars sorted oldest first
fn to_price_series(ticker: &str, bars: &[AggregateBar]) -> PriceSeries {
    let prices = bars
        .iter()
        .map(|bar| PricePoint {
            date: DateTime::from_timestamp_millis(bar.t).unwrap_or_default(),
            open: bar.o,
            high: bar.h,
            low: bar.l,
            close: bar.c,
            volume: bar.v,
        })
        .collect();

    let (price_range_min, price_range_max) = chart_range(bars.iter().map(|bar| bar.c));

    PriceSeries {
        ticker: ticker.to_string(),
        prices,
        current_price: bars.last().map(|bar| bar.c),
        previous_close: bars.len().checked_sub(2).map(|i| bars[i].c),
        price_range_min,
        price_range_max,
    }
}

/// Chart axis bounds with a buffer; a flat series is padded by a share of its price
fn chart_range(closes: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>) {
    let (min, max) = closes.fold((None, None), |(min, max): (Option<f64>, Option<f64>), c| {
        (
            Some(min.map_or(c, |m| m.min(c))),
            Some(max.map_or(c, |m| m.max(c))),
        )
    });

    match (min, max) {
        (Some(min), Some(max)) => {
            let range = max - min;
            let buffer = if range > 0.0 {
                range * PRICE_CHART_BUFFER_PCT
            } else {
                max * PRICE_CHART_BUFFER_PCT
            };
            (Some(min - buffer), Some(max + buffer))
        }
        _ => (None, None),
    }
}

/// Builds a quote from bars sorted newest first
fn to_quote(ticker: &str, bars: &[AggregateBar]) -> Result<RelatedQuote, UpstreamError> {
    let [latest, previous, ..] = bars else {
        return Err(UpstreamError::NoData(format!(
            "{ticker}: got {} data points, need 2",
            bars.len()
        )));
    };

    if previous.c == 0.0 {
        return Err(UpstreamError::NoData(format!("{ticker}: previous close is zero")));
    }

    let change = latest.c - previous.c;
    Ok(RelatedQuote {
        current: latest.c,
        change,
        change_pct: change / previous.c * 100.0,
    })
}
