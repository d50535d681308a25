//! Command-line interface parsing for findash
//!
//! Every option can also be set through the environment (a `.env` file is
//! loaded first), so the same binary works for interactive use and for a
//! scheduled background-refresh deployment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{builder::BoolishValueParser, Args, Parser, Subcommand};
use thiserror::Error;

use crate::cache::CacheStore;
use crate::config::{ApiKeys, Config, DeploymentMode, RetrySettings, TickerInfo};
use crate::error::AppError;
use crate::logging::LogFormat;

/// Accepted exponential backoff base, in seconds
const MIN_BACKOFF_BASE_SECS: f64 = 0.1;
const MAX_BACKOFF_BASE_SECS: f64 = 3600.0;

const MAX_RATE_LIMIT_BACKOFF_SECS: u64 = 3600;

/// One year
const MAX_CACHE_TTL_MINUTES: i64 = 525_600;

/// Ten years; keeps `now - max_age` inside the representable date range
const MAX_CACHE_AGE_HOURS: i64 = 87_600;

/// One year
const MAX_REFRESH_INTERVAL_HOURS: u64 = 8_760;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The ticker is not one of the tracked tickers
    #[error("Unknown ticker: '{symbol}'. Tracked tickers: {known}")]
    UnknownTicker { symbol: String, known: String },
}

/// findash - cached stock prices, news and AI commentary
#[derive(Parser, Debug)]
#[command(name = "findash")]
#[command(about = "Stock prices, news and AI insights with cache fallback")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub cache: CacheArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(flatten)]
    pub providers: ProviderArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print price, news, related tickers and the AI insight for one ticker
    ///
    /// Examples:
    ///   findash show NFLX
    ///   findash show tsla --regenerate-insight
    Show(ShowArgs),
    /// Fetch everything for every tracked ticker and write it to the cache
    Refresh(RefreshArgs),
    /// List tracked tickers and their related baskets
    Tickers,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Ticker symbol (case-insensitive)
    pub ticker: String,

    /// Generate a new insight instead of showing the cached one
    #[arg(long)]
    pub regenerate_insight: bool,

    /// Print the insight at once instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RefreshArgs {
    /// Keep running and refresh every --refresh-interval-hours
    #[arg(long)]
    pub watch: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    /// Directory holding cache files [default: the user cache directory]
    #[arg(long, env = "FINDASH_CACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Minutes a cache entry counts as fresh
    #[arg(
        long,
        env = "CACHE_TTL_MINUTES",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..=MAX_CACHE_TTL_MINUTES),
    )]
    pub cache_ttl_minutes: u32,

    /// Hours after which cache entries are deleted
    #[arg(
        long,
        env = "CACHE_MAX_AGE_HOURS",
        default_value_t = 24,
        value_parser = clap::value_parser!(u32).range(1..=MAX_CACHE_AGE_HOURS),
    )]
    pub cache_max_age_hours: u32,

    /// Serve cached data only and never call providers on the read path
    #[arg(long, env = "BACKGROUND_REFRESH", value_parser = BoolishValueParser::new())]
    pub background_refresh: bool,

    /// Hours between background refresh cycles
    #[arg(
        long,
        env = "REFRESH_INTERVAL_HOURS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_INTERVAL_HOURS),
    )]
    pub refresh_interval_hours: u64,
}

#[derive(Debug, Args, Clone)]
pub struct RetryArgs {
    /// Retries after the first failed attempt
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds
    #[arg(
        long,
        env = "RETRY_BACKOFF_BASE",
        default_value_t = 0.5,
        value_parser = parse_backoff_base,
    )]
    pub retry_backoff_base: f64,

    /// Seconds added to the wait after each rate-limited attempt
    #[arg(
        long,
        env = "RATE_LIMIT_BACKOFF_SECS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..=MAX_RATE_LIMIT_BACKOFF_SECS),
    )]
    pub rate_limit_backoff_secs: u64,

    /// Timeout for a single provider request, in seconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub request_timeout: u64,
}

#[derive(Debug, Args, Clone)]
pub struct ProviderArgs {
    #[arg(long, env = "POLYGON_API_KEY", hide_env_values = true, default_value = "")]
    pub polygon_api_key: String,

    #[arg(long, env = "NEWSDATAHUB_API_KEY", hide_env_values = true, default_value = "")]
    pub newsdatahub_api_key: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub openai_api_key: String,

    /// Articles requested from the news provider per ticker
    #[arg(
        long,
        env = "NEWS_FETCH_COUNT",
        default_value_t = 100,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub news_fetch_count: u32,

    /// Articles kept after filtering
    #[arg(
        long,
        env = "NEWS_DISPLAY_COUNT",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub news_display_count: u32,

    /// Delay between characters when streaming the insight, in milliseconds
    #[arg(long, env = "STREAMING_CHAR_DELAY_MS", default_value_t = 10)]
    pub streaming_char_delay_ms: u64,
}

#[derive(Debug, Args, Clone)]
pub struct LoggingArgs {
    /// Log filter (trace|debug|info|warn|error, or tracing directives)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "LOG_DIR", value_name = "PATH")]
    pub log_dir: Option<PathBuf>,
}

fn parse_backoff_base(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !value.is_finite() || !(MIN_BACKOFF_BASE_SECS..=MAX_BACKOFF_BASE_SECS).contains(&value) {
        return Err(format!(
            "must be between {MIN_BACKOFF_BASE_SECS} and {MAX_BACKOFF_BASE_SECS} seconds"
        ));
    }
    Ok(value)
}

impl Cli {
    /// Builds the runtime configuration from parsed arguments.
    ///
    /// # Returns
    /// * `Ok(Config)` with every setting resolved
    /// * `Err(AppError::NoCacheDir)` if no cache directory was given and none can be derived
    pub fn to_config(&self) -> Result<Config, AppError> {
        let cache_dir = match &self.cache.cache_dir {
            Some(dir) => dir.clone(),
            None => CacheStore::default_dir().ok_or(AppError::NoCacheDir)?,
        };

        let mut config = Config::new(cache_dir);
        config.cache_ttl = chrono::Duration::minutes(i64::from(self.cache.cache_ttl_minutes));
        config.cache_max_age = chrono::Duration::hours(i64::from(self.cache.cache_max_age_hours));
        config.mode = DeploymentMode::from_background_flag(self.cache.background_refresh);
        config.refresh_interval =
            Duration::from_secs(self.cache.refresh_interval_hours.saturating_mul(3600));
        config.retry = RetrySettings {
            max_retries: self.retry.max_retries,
            backoff_base: Duration::from_secs_f64(self.retry.retry_backoff_base),
            rate_limit_unit: Duration::from_secs(self.retry.rate_limit_backoff_secs),
        };
        config.request_timeout = Duration::from_secs(self.retry.request_timeout);
        config.news_fetch_count = self.providers.news_fetch_count;
        config.news_display_count = self.providers.news_display_count as usize;
        config.streaming_char_delay =
            Duration::from_millis(self.providers.streaming_char_delay_ms);
        config.api_keys = ApiKeys {
            polygon: self.providers.polygon_api_key.clone(),
            newsdatahub: self.providers.newsdatahub_api_key.clone(),
            openai: self.providers.openai_api_key.clone(),
        };
        Ok(config)
    }
}

/// Resolves a ticker argument against the tracked tickers.
///
/// # Arguments
/// * `config` - The runtime configuration
/// * `symbol` - The ticker as typed on the command line
///
/// # Returns
/// * `Ok(&TickerInfo)` if the ticker is tracked
/// * `Err(CliError::UnknownTicker)` otherwise
pub fn resolve_ticker<'a>(config: &'a Config, symbol: &str) -> Result<&'a TickerInfo, CliError> {
    config.ticker(symbol).ok_or_else(|| CliError::UnknownTicker {
        symbol: symbol.to_string(),
        known: config.symbols().join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["findash", "--cache-dir", "/tmp/findash-test"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_parse_show_command() {
        let cli = parse(&["show", "nflx", "--regenerate-insight"]);
        match cli.command {
            Command::Show(args) => {
                assert_eq!(args.ticker, "nflx");
                assert!(args.regenerate_insight);
                assert!(!args.no_stream);
            }
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_refresh_watch() {
        let cli = parse(&["refresh", "--watch"]);
        assert!(matches!(cli.command, Command::Refresh(RefreshArgs { watch: true })));
    }

    #[test]
    fn test_to_config_applies_overrides() {
        let cli = parse(&[
            "--cache-ttl-minutes",
            "5",
            "--retry-backoff-base",
            "1.5",
            "--background-refresh",
            "--max-retries",
            "0",
            "tickers",
        ]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/findash-test"));
        assert_eq!(config.cache_ttl, chrono::Duration::minutes(5));
        assert_eq!(config.retry.backoff_base, Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.mode, DeploymentMode::BackgroundRefreshOnly);
    }

    #[test]
    fn test_backoff_base_below_minimum_is_rejected() {
        let result = Cli::try_parse_from([
            "findash",
            "--retry-backoff-base",
            "0.01",
            "tickers",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let result = Cli::try_parse_from(["findash", "--cache-ttl-minutes", "0", "tickers"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_backoff_base() {
        assert_eq!(parse_backoff_base("0.5").unwrap(), 0.5);
        assert_eq!(parse_backoff_base("0.1").unwrap(), 0.1);
        assert!(parse_backoff_base("0.05").is_err());
        assert!(parse_backoff_base("abc").is_err());
        assert!(parse_backoff_base("NaN").is_err());
        assert_eq!(parse_backoff_base("3600").unwrap(), 3600.0);
        assert!(parse_backoff_base("3600.5").is_err());
        assert!(parse_backoff_base("1e30").is_err());
        assert!(parse_backoff_base("inf").is_err());
    }

    #[test]
    fn test_huge_backoff_base_is_a_parse_error() {
        let result = Cli::try_parse_from([
            "findash",
            "--cache-dir",
            "/tmp/findash-test",
            "--retry-backoff-base",
            "1e30",
            "tickers",
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("must be between"));
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        for args in [
            ["--refresh-interval-hours", "18446744073709551615"],
            ["--refresh-interval-hours", "8761"],
            ["--cache-max-age-hours", "4294967295"],
            ["--cache-ttl-minutes", "525601"],
            ["--rate-limit-backoff-secs", "3601"],
        ] {
            let result = Cli::try_parse_from(["findash", args[0], args[1], "tickers"]);
            assert!(result.is_err(), "{} {} should be rejected", args[0], args[1]);
        }
    }

    #[test]
    fn test_largest_accepted_values_build_a_config() {
        let cli = parse(&[
            "--refresh-interval-hours",
            "8760",
            "--cache-max-age-hours",
            "87600",
            "--retry-backoff-base",
            "3600",
            "tickers",
        ]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(8760 * 3600));
        assert_eq!(config.retry.backoff_base, Duration::from_secs(3600));
        assert_eq!(config.cache_max_age, chrono::Duration::hours(87_600));
    }

    #[test]
    fn test_resolve_ticker() {
        let config = Config::new(PathBuf::from("/tmp/findash-test"));
        assert_eq!(resolve_ticker(&config, "googl").unwrap().symbol, "GOOGL");

        let err = resolve_ticker(&config, "AAPL").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Unknown ticker"));
        assert!(message.contains("AAPL"));
        assert!(message.contains("NFLX, GOOGL, TSLA"));
    }
}
