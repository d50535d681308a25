//! Plain-text rendering of dashboard sections
//!
//! Every section renders even when its data is missing: `None` becomes an
//! explicit "unavailable" line, and data served from the fallback path
//! carries its age so the reader knows it is not live.

use std::fmt::Write as _;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

use crate::cache::format_age;
use crate::config::TickerInfo;
use crate::data::{Insight, NewsFeed, PriceSeries, RelatedBasket};
use crate::orchestrator::FetchOutcome;
use crate::refresh::{InsightStatus, RefreshSummary, TickerReport};

/// Suffix telling the reader where the data came from, if not live
pub fn staleness_note<T>(outcome: &FetchOutcome<T>) -> String {
    match (outcome.is_fallback, outcome.data_age) {
        (true, Some(age)) => format!(" (cached, {})", format_age(age)),
        (true, None) => " (cached)".to_string(),
        (false, Some(age)) => format!(" (generated {})", format_age(age)),
        (false, None) => String::new(),
    }
}

fn unavailable(section: &str) -> String {
    format!("{section}: unavailable\n")
}

/// Header line plus the latest price and daily move
pub fn price_section(ticker: &TickerInfo, price: Option<&FetchOutcome<PriceSeries>>) -> String {
    let mut out = format!("{} - {} ({})\n", ticker.symbol, ticker.name, ticker.exchange);

    let Some(outcome) = price else {
        out.push_str(&unavailable("Price"));
        return out;
    };
    let series = &outcome.payload;

    match series.current_price {
        Some(current) => {
            let _ = write!(out, "Price: ${current:.2}");
            if let Some(change) = series.change_pct() {
                let _ = write!(out, " ({change:+.2}%)");
            }
        }
        None => out.push_str("Price: no recent trading data"),
    }
    out.push_str(&staleness_note(outcome));
    out.push('\n');

    if let (Some(first), Some(last)) = (series.prices.first(), series.prices.last()) {
        let low = series.prices.iter().map(|p| p.low).fold(f64::INFINITY, f64::min);
        let high = series.prices.iter().map(|p| p.high).fold(f64::NEG_INFINITY, f64::max);
        let _ = writeln!(
            out,
            "Range {} to {}: low ${low:.2}, high ${high:.2} ({} days)",
            first.date.format("%Y-%m-%d"),
            last.date.format("%Y-%m-%d"),
            series.prices.len()
        );
    }
    out
}

/// Up to `limit` headlines, newest first
pub fn news_section(news: Option<&FetchOutcome<NewsFeed>>, limit: usize) -> String {
    let Some(outcome) = news else {
        return unavailable("News");
    };

    let mut out = format!("News{}:\n", staleness_note(outcome));
    if outcome.payload.articles.is_empty() {
        out.push_str("  no recent articles\n");
        return out;
    }
    for article in outcome.payload.articles.iter().take(limit) {
        let source = article.source_title.as_deref().unwrap_or("Unknown");
        let date = article
            .pub_date
            .as_deref()
            .map(|d| d.get(..10).unwrap_or(d))
            .unwrap_or("");
        let separator = if date.is_empty() { "" } else { ", " };
        let _ = writeln!(out, "  - {} ({source}{separator}{date})", article.title);
    }
    out
}

/// One line per related ticker; members that failed to fetch are marked
pub fn related_section(
    ticker: &TickerInfo,
    related: Option<&FetchOutcome<RelatedBasket>>,
) -> String {
    if ticker.related.is_empty() {
        return String::new();
    }
    let Some(outcome) = related else {
        return unavailable("Related");
    };

    let mut out = format!("Related{}:\n", staleness_note(outcome));
    for member in &ticker.related {
        match outcome.payload.quotes.get(&member.symbol) {
            Some(quote) => {
                let _ = writeln!(
                    out,
                    "  {:<5} {:<24} ${:>9.2} {:>+8.2} ({:+.2}%)",
                    member.symbol, member.name, quote.current, quote.change, quote.change_pct
                );
            }
            None => {
                let _ = writeln!(out, "  {:<5} {:<24} unavailable", member.symbol, member.name);
            }
        }
    }
    out
}

/// Title line of the insight section; the text itself is streamed separately
pub fn insight_header(insight: Option<&FetchOutcome<Insight>>) -> String {
    match insight {
        Some(outcome) => format!("AI insight{}:", staleness_note(outcome)),
        None => "AI insight: unavailable".to_string(),
    }
}

/// Tracked tickers with their related baskets
pub fn tickers_listing(tickers: &[TickerInfo]) -> String {
    let mut out = String::new();
    for ticker in tickers {
        let _ = writeln!(out, "{:<5} {} ({})", ticker.symbol, ticker.name, ticker.exchange);
        for member in &ticker.related {
            let _ = writeln!(
                out,
                "      {:<5} {} ({})",
                member.symbol, member.name, member.exchange
            );
        }
    }
    out
}

/// One line per ticker of a refresh cycle
pub fn refresh_report(report: &TickerReport) -> String {
    let mark = |ok: bool| if ok { "ok" } else { "failed" };
    let insight = match report.insight {
        InsightStatus::Generated => "ok",
        InsightStatus::Failed => "failed",
        InsightStatus::Skipped => "skipped",
    };
    format!(
        "{:<5} price {}, news {}, related {}/{}, insight {}",
        report.ticker,
        mark(report.price),
        mark(report.news),
        report.related_successful,
        report.related_total,
        insight
    )
}

pub fn refresh_summary(summary: &RefreshSummary) -> String {
    format!(
        "Refreshed {}/{} tickers completely in {:.1}s",
        summary.complete_tickers(),
        summary.reports.len(),
        summary.elapsed.as_secs_f64()
    )
}

/// Yields `text` one character at a time, waiting `delay` before each
pub fn typewriter(text: &str, delay: Duration) -> impl Stream<Item = char> {
    let chars: Vec<char> = text.chars().collect();
    stream::iter(chars).then(move |c| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        c
    })
}
