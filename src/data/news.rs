//! NewsDataHub client
//!
//! Searches recent business news by company name, follows one pagination
//! cursor, and trims the result to a small, varied set of relevant articles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{checked, Article, NewsFeed};
use crate::config::Config;
use crate::error::UpstreamError;
use crate::source::SourceAdapter;

/// Base URL for the NewsDataHub API
const NEWSDATAHUB_BASE_URL: &str = "https://api.newsdatahub.com/v1";

/// How far back to search
const NEWS_WINDOW_DAYS: i64 = 30;

/// Remaining-request count below which quota usage is logged as a warning
const QUOTA_WARNING_THRESHOLD: u32 = 20;

/// Articles kept per publisher so one outlet cannot fill the feed
const MAX_ARTICLES_PER_SOURCE: usize = 2;

/// One page of search results
#[derive(Debug, Deserialize)]
struct NewsPage {
    #[serde(default)]
    data: Vec<RawArticle>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Article as returned by the provider; every field may be null
#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    source_title: Option<String>,
    pub_date: Option<String>,
    article_link: Option<String>,
    description: Option<String>,
}

impl RawArticle {
    /// Articles without a title are useless to display and are dropped
    fn into_article(self) -> Option<Article> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        Some(Article {
            title,
            source_title: self.source_title,
            pub_date: self.pub_date,
            article_link: self.article_link,
            description: self.description,
        })
    }
}

/// Request quota reported in the `X-RateLimit-*` headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset: Option<String>,
}

impl QuotaStatus {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let number = |name: &str, default: u32| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            limit: number("x-ratelimit-limit", 100),
            remaining: number("x-ratelimit-remaining", 0),
            reset: headers
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    pub fn used(&self) -> u32 {
        self.limit.saturating_sub(self.remaining)
    }

    pub fn is_low(&self) -> bool {
        self.remaining < QUOTA_WARNING_THRESHOLD
    }
}

/// Client for the NewsDataHub search API
#[derive(Debug, Clone)]
pub struct NewsClient {
    client: Client,
    api_key: String,
    base_url: String,
    fetch_count: u32,
    display_count: usize,
    /// Ticker symbol to search query
    search_terms: HashMap<String, String>,
}

impl NewsClient {
    /// Creates a client from the configured key, timeout, counts and search terms
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(config.request_timeout).build()?,
            api_key: config.api_keys.newsdatahub.clone(),
            base_url: NEWSDATAHUB_BASE_URL.to_string(),
            fetch_count: config.news_fetch_count,
            display_count: config.news_display_count,
            search_terms: config
                .tickers
                .iter()
                .map(|t| (t.symbol.clone(), t.search_term.clone()))
                .collect(),
        })
    }

    /// Points the client at a different host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_term<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.search_terms
            .get(ticker)
            .map(String::as_str)
            .unwrap_or(ticker)
    }

    async fn page(
        &self,
        search_term: &str,
        cursor: Option<&str>,
    ) -> Result<(NewsPage, QuotaStatus), UpstreamError> {
        let start_date = (Utc::now() - ChronoDuration::days(NEWS_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let per_page = self.fetch_count.to_string();

        let mut request = self
            .client
            .get(format!("{}/news", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&[
                ("language", "en"),
                ("topic", "business,economy,finance"),
                ("start_date", start_date.as_str()),
                ("q", search_term),
                ("search_in", "title"),
                ("sort_by", "date"),
                ("per_page", per_page.as_str()),
            ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = checked(request.send().await?).await?;
        let quota = QuotaStatus::from_headers(response.headers());
        let text = response.text().await?;
        Ok((serde_json::from_str(&text)?, quota))
    }

    /// Fetches up to two pages of articles and curates them for display
    pub async fn fetch_news(&self, ticker: &str) -> Result<NewsFeed, UpstreamError> {
        let search_term = self.search_term(ticker);
        let started = Instant::now();

        let (first, mut quota) = self.page(search_term, None).await?;
        let mut raw = first.data;
        let mut pages = 1;
        if let Some(cursor) = first.next_cursor.as_deref() {
            let (second, second_quota) = self.page(search_term, Some(cursor)).await?;
            raw.extend(second.data);
            quota = second_quota;
            pages += 1;
        }

        let fetched: Vec<Article> = raw.into_iter().filter_map(RawArticle::into_article).collect();
        let fetched_count = fetched.len();
        let articles = curate_articles(fetched, search_term, self.display_count);

        info!(
            ticker,
            search_term,
            pages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            quota_used = quota.used(),
            quota_limit = quota.limit,
            quota_remaining = quota.remaining,
            fetched = fetched_count,
            kept = articles.len(),
            "newsdatahub articles fetched"
        );
        if quota.is_low() {
            warn!(
                quota_used = quota.used(),
                quota_limit = quota.limit,
                reset = quota.reset.as_deref().unwrap_or("unknown"),
                "newsdatahub quota low"
            );
        }

        Ok(NewsFeed {
            ticker: ticker.to_string(),
            articles,
        })
    }
}

#[async_trait]
impl SourceAdapter<NewsFeed> for NewsClient {
    async fn fetch(&self, identifier: &str) -> Result<NewsFeed, UpstreamError> {
        self.fetch_news(identifier).await
    }
}

/// Keeps relevant, distinct articles, at most two per source, newest first
///
/// `search_term` may contain several alternatives joined by ` OR `; an
/// article is relevant when its title mentions any of them.
pub fn curate_articles(articles: Vec<Article>, search_term: &str, limit: usize) -> Vec<Article> {
    let terms: Vec<String> = search_term
        .split(" OR ")
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect();

    let total = articles.len();
    let relevant: Vec<Article> = articles
        .into_iter()
        .filter(|a| {
            let title = a.title.to_lowercase();
            terms.iter().any(|term| title.contains(term.as_str()))
        })
        .collect();
    let relevant_count = relevant.len();

    let mut seen_headlines = HashSet::new();
    let unique: Vec<Article> = relevant
        .into_iter()
        .filter(|a| seen_headlines.insert(a.title.trim().to_lowercase()))
        .collect();
    let unique_count = unique.len();

    let mut by_source: BTreeMap<String, Vec<Article>> = BTreeMap::new();
    for article in unique {
        let source = article
            .source_title
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        by_source.entry(source).or_default().push(article);
    }

    let mut result: Vec<Article> = by_source
        .into_values()
        .flat_map(|mut list| {
            list.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
            list.truncate(MAX_ARTICLES_PER_SOURCE);
            list
        })
        .collect();
    result.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

    debug!(
        total,
        relevant = relevant_count,
        unique = unique_count,
        per_source = result.len(),
        "news curation"
    );

    result.truncate(limit);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use reqwest::header::HeaderValue;
    use std::path::PathBuf;

    fn article(title: &str, source: &str, date: &str) -> Article {
        Article {
            title: title.to_string(),
            source_title: Some(source.to_string()),
            pub_date: Some(date.to_string()),
            article_link: None,
            description: None,
        }
    }

    #[test]
    fn test_parse_news_page_drops_untitled_articles() {
        let json = r#"{
            "next_cursor": "abc",
            "data": [
                {"title": "Netflix raises prices", "source_title": "Reuters", "pub_date": "2026-01-02T10:00:00", "article_link": "https://example.com/a"},
                {"title": null, "source_title": "Reuters"},
                {"title": "   "}
            ]
        }"#;

        let page: NewsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));

        let articles: Vec<Article> = page
            .data
            .into_iter()
            .filter_map(RawArticle::into_article)
            .collect();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Netflix raises prices");
        assert_eq!(articles[0].article_link.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_curate_filters_irrelevant_titles() {
        let articles = vec![
            article("Netflix subscriber growth", "A", "2026-01-03"),
            article("Markets rally on Friday", "B", "2026-01-04"),
        ];

        let curated = curate_articles(articles, "Netflix", 5);

        assert_eq!(curated.len(), 1);
        assert_eq!(curated[0].title, "Netflix subscriber growth");
    }

    #[test]
    fn test_curate_handles_or_queries() {
        let articles = vec![
            article("Google unveils model", "A", "2026-01-03"),
            article("Alphabet earnings beat", "B", "2026-01-04"),
            article("Apple event recap", "C", "2026-01-05"),
        ];

        let curated = curate_articles(articles, "Google OR Alphabet", 5);

        let titles: Vec<&str> = curated.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Alphabet earnings beat", "Google unveils model"]);
    }

    #[test]
    fn test_curate_removes_duplicate_headlines() {
        let articles = vec![
            article("Tesla recalls cars", "A", "2026-01-05"),
            article("  tesla RECALLS cars ", "B", "2026-01-04"),
        ];

        let curated = curate_articles(articles, "Tesla", 5);

        assert_eq!(curated.len(), 1);
        assert_eq!(curated[0].source_title.as_deref(), Some("A"));
    }

    #[test]
    fn test_curate_keeps_two_freshest_per_source_sorted_newest_first() {
        let articles = vec![
            article("Tesla one", "Wire", "2026-01-01"),
            article("Tesla two", "Wire", "2026-01-03"),
            article("Tesla three", "Wire", "2026-01-02"),
            article("Tesla four", "Blog", "2026-01-04"),
        ];

        let curated = curate_articles(articles, "Tesla", 10);

        let titles: Vec<&str> = curated.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Tesla four", "Tesla two", "Tesla three"]);
    }

    #[test]
    fn test_curate_respects_display_limit() {
        let articles = (0..10)
            .map(|i| {
                let date = format!("2026-01-{:02}", i + 1);
                article(&format!("Netflix story {i}"), &format!("S{i}"), &date)
            })
            .collect();

        let curated = curate_articles(articles, "Netflix", 5);

        assert_eq!(curated.len(), 5);
        assert_eq!(curated[0].title, "Netflix story 9");
    }

    #[test]
    fn test_quota_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("100"));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("15"));
        headers.insert("X-RateLimit-Reset", HeaderValue::from_static("2026-02-01"));

        let quota = QuotaStatus::from_headers(&headers);

        assert_eq!(quota.limit, 100);
        assert_eq!(quota.remaining, 15);
        assert_eq!(quota.used(), 85);
        assert!(quota.is_low());
        assert_eq!(quota.reset.as_deref(), Some("2026-02-01"));
    }

    #[test]
    fn test_quota_defaults_when_headers_missing() {
        let quota = QuotaStatus::from_headers(&HeaderMap::new());
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.remaining, 0);
        assert!(quota.reset.is_none());
    }

    fn client(server: &MockServer) -> NewsClient {
        let mut config = Config::new(PathBuf::from("unused"));
        config.api_keys.newsdatahub = "news-key".to_string();
        NewsClient::from_config(&config)
            .unwrap()
            .with_base_url(server.base_url())
    }

    #[tokio::test]
    async fn test_cursor_fetches_second_page() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/news")
                    .header("x-api-key", "news-key")
                    .query_param("q", "Netflix")
                    .query_param("search_in", "title")
                    .query_param("per_page", "100")
                    .query_param_missing("cursor");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"next_cursor": "c2", "data": [{"title": "Netflix adds subscribers", "source_title": "Reuters", "pub_date": "2026-01-03T09:00:00"}]}"#);
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/news")
                    .query_param("q", "Netflix")
                    .query_param("cursor", "c2");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"next_cursor": null, "data": [{"title": "Netflix opens studio", "source_title": "Bloomberg", "pub_date": "2026-01-02T09:00:00"}]}"#);
            })
            .await;

        let feed = client(&server).fetch_news("NFLX").await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(feed.ticker, "NFLX");
        let titles: Vec<&str> = feed.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Netflix adds subscribers", "Netflix opens studio"]);
    }

    #[tokio::test]
    async fn test_single_page_without_cursor() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET").path("/news");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"data": [{"title": "Netflix adds subscribers", "source_title": "Reuters"}]}"#);
            })
            .await;

        let feed = client(&server).fetch_news("NFLX").await.unwrap();

        assert_eq!(mock.hits_async().await, 1);
        assert_eq!(feed.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_read_from_response_headers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/news");
                then.status(200)
                    .header("content-type", "application/json")
                    .header("x-ratelimit-limit", "100")
                    .header("x-ratelimit-remaining", "7")
                    .header("x-ratelimit-reset", "2026-02-01T00:00:00Z")
                    .body(r#"{"data": []}"#);
            })
            .await;

        let (page, quota) = client(&server).page("Netflix", None).await.unwrap();

        assert!(page.data.is_empty());
        assert_eq!(
            quota,
            QuotaStatus {
                limit: 100,
                remaining: 7,
                reset: Some("2026-02-01T00:00:00Z".to_string()),
            }
        );
        assert_eq!(quota.used(), 93);
        assert!(quota.is_low());
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/news");
                then.status(429).body("quota exhausted");
            })
            .await;

        let err = client(&server).fetch_news("NFLX").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("quota exhausted"));
    }
}
