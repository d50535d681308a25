//! Fan-out coordinator: concurrent, independently failing fetches over many keys

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;
use tracing::{info, warn};

use crate::data::{RelatedBasket, RelatedQuote};
use crate::retry::RetryExecutor;
use crate::source::SourceAdapter;

/// Payloads of the keys that succeeded, plus how many were attempted
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutResult<T> {
    pub results: BTreeMap<String, T>,
    pub total: usize,
}

impl<T> FanOutResult<T> {
    pub fn successful(&self) -> usize {
        self.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.successful() == self.total
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl From<FanOutResult<RelatedQuote>> for RelatedBasket {
    fn from(result: FanOutResult<RelatedQuote>) -> Self {
        RelatedBasket {
            quotes: result.results,
        }
    }
}

/// Runs `fetch_one` for every key concurrently
///
/// A failing key is logged and left out of the result; it never cancels the
/// other keys. Zero, partial and full success are all normal outcomes.
pub async fn fetch_many<T, E, F, Fut>(label: &str, keys: &[String], fetch_one: F) -> FanOutResult<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let pending = keys.iter().map(|key| {
        let fut = fetch_one(key.clone());
        async move { (key, fut.await) }
    });

    let mut results = BTreeMap::new();
    for (key, outcome) in join_all(pending).await {
        match outcome {
            Ok(payload) => {
                results.insert(key.clone(), payload);
            }
            Err(err) => warn!(fanout = label, key = %key, error = %err, "fan-out member failed"),
        }
    }

    let total = keys.len();
    let successful = results.len();
    if successful == 0 && total > 0 {
        warn!(fanout = label, successful, total, "fan-out produced no results");
    } else if successful < total {
        warn!(fanout = label, successful, total, "fan-out partially succeeded");
    } else {
        info!(fanout = label, successful, total, "fan-out complete");
    }

    FanOutResult { results, total }
}

/// Quotes for a basket of related tickers, each fetched with retries
pub async fn related_basket(
    quotes: &dyn SourceAdapter<RelatedQuote>,
    retry: &RetryExecutor,
    symbols: &[String],
) -> FanOutResult<RelatedQuote> {
    fetch_many("related", symbols, |symbol| async move {
        retry.run(&symbol, || quotes.fetch(&symbol)).await
    })
    .await
}
