//! Runtime configuration
//!
//! A `Config` is assembled once at startup (see `cli::Cli::to_config`) and
//! handed by reference to every component. Nothing mutates it afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::retry::{BackoffPolicy, RetryExecutor};

/// Whether the read path may call upstream providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    /// Fetch on demand when the cache is not fresh
    #[default]
    Interactive,
    /// Serve only what the refresh job has cached
    BackgroundRefreshOnly,
}

impl DeploymentMode {
    pub fn from_background_flag(background_refresh: bool) -> Self {
        if background_refresh {
            DeploymentMode::BackgroundRefreshOnly
        } else {
            DeploymentMode::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, DeploymentMode::Interactive)
    }
}

/// A ticker that appears in a related basket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTicker {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
}

/// A tracked ticker and everything needed to fetch its sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerInfo {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    /// Query used against the news provider; company names match better than symbols
    pub search_term: String,
    pub related: Vec<RelatedTicker>,
}

impl TickerInfo {
    pub fn related_symbols(&self) -> Vec<String> {
        self.related.iter().map(|r| r.symbol.clone()).collect()
    }
}

/// Retry tuning for upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub rate_limit_unit: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            rate_limit_unit: Duration::from_secs(15),
        }
    }
}

/// Credentials for the upstream providers; empty means "not configured"
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub polygon: String,
    pub newsdatahub: String,
    pub openai: String,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("polygon", &!self.polygon.is_empty())
            .field("newsdatahub", &!self.newsdatahub.is_empty())
            .field("openai", &!self.openai.is_empty())
            .finish()
    }
}

/// Static configuration snapshot
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub cache_max_age: chrono::Duration,
    pub retry: RetrySettings,
    pub mode: DeploymentMode,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub news_fetch_count: u32,
    pub news_display_count: usize,
    pub streaming_char_delay: Duration,
    pub api_keys: ApiKeys,
    pub tickers: Vec<TickerInfo>,
}

impl Config {
    /// Configuration with every default except the cache directory
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            cache_ttl: chrono::Duration::minutes(10),
            cache_max_age: chrono::Duration::hours(24),
            retry: RetrySettings::default(),
            mode: DeploymentMode::Interactive,
            refresh_interval: Duration::from_secs(3 * 3600),
            request_timeout: Duration::from_secs(10),
            news_fetch_count: 100,
            news_display_count: 5,
            streaming_char_delay: Duration::from_millis(10),
            api_keys: ApiKeys::default(),
            tickers: default_tickers(),
        }
    }

    /// Looks up a tracked ticker (case-insensitive)
    pub fn ticker(&self, symbol: &str) -> Option<&TickerInfo> {
        self.tickers
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.tickers.iter().map(|t| t.symbol.as_str()).collect()
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(self.cache_dir.clone(), self.cache_ttl, self.cache_max_age)
    }

    pub fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::new(
            BackoffPolicy::new(self.retry.backoff_base, self.retry.rate_limit_unit),
            self.retry.max_retries,
        )
    }
}

fn related(symbol: &str, name: &str, exchange: &str) -> RelatedTicker {
    RelatedTicker {
        symbol: symbol.to_string(),
        name: name.to_string(),
        exchange: exchange.to_string(),
    }
}

/// The tickers tracked out of the box, each with a basket of related names
pub fn default_tickers() -> Vec<TickerInfo> {
    vec![
        TickerInfo {
            symbol: "NFLX".to_string(),
            name: "Netflix".to_string(),
            exchange: "NASDAQ".to_string(),
            search_term: "Netflix".to_string(),
            related: vec![
                related("DIS", "Disney", "NYSE"),
                related("PARA", "Paramount", "NASDAQ"),
                related("WBD", "Warner Bros Discovery", "NASDAQ"),
            ],
        },
        TickerInfo {
            symbol: "GOOGL".to_string(),
            name: "Alphabet Inc.".to_string(),
            exchange: "NASDAQ".to_string(),
            search_term: "Google OR Alphabet".to_string(),
            related: vec![
                related("TSLA", "Tesla Inc.", "NASDAQ"),
                related("META", "Meta", "NASDAQ"),
                related("AMZN", "Amazon", "NASDAQ"),
            ],
        },
        TickerInfo {
            symbol: "TSLA".to_string(),
            name: "Tesla Inc.".to_string(),
            exchange: "NASDAQ".to_string(),
            search_term: "Tesla".to_string(),
            related: vec![
                related("RIVN", "Rivian", "NASDAQ"),
                related("GM", "General Motors", "NYSE"),
                related("F", "Ford", "NYSE"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/tmp/findash"));
        assert_eq!(config.cache_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.cache_max_age, chrono::Duration::hours(24));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(500));
        assert_eq!(config.mode, DeploymentMode::Interactive);
        assert_eq!(config.symbols(), vec!["NFLX", "GOOGL", "TSLA"]);
    }

    #[test]
    fn test_every_ticker_has_a_basket_of_three() {
        for ticker in default_tickers() {
            assert_eq!(ticker.related.len(), 3, "{} basket", ticker.symbol);
            assert!(!ticker.search_term.is_empty());
        }
    }

    #[test]
    fn test_ticker_lookup_is_case_insensitive() {
        let config = Config::new(PathBuf::from("/tmp/findash"));
        assert_eq!(config.ticker("nflx").map(|t| t.name.as_str()), Some("Netflix"));
        assert!(config.ticker("AAPL").is_none());
        assert_eq!(
            config.ticker("TSLA").unwrap().related_symbols(),
            vec!["RIVN", "GM", "F"]
        );
    }

    #[test]
    fn test_deployment_mode_from_flag() {
        assert_eq!(
            DeploymentMode::from_background_flag(true),
            DeploymentMode::BackgroundRefreshOnly
        );
        assert!(DeploymentMode::from_background_flag(false).is_interactive());
    }

    #[test]
    fn test_api_keys_debug_hides_secrets() {
        let keys = ApiKeys {
            polygon: "secret-polygon".to_string(),
            ..Default::default()
        };
        let debug = format!("{keys:?}");
        assert!(!debug.contains("secret-polygon"));
        assert!(debug.contains("polygon: true"));
        assert!(debug.contains("openai: false"));
    }
}
