//! Fetch orchestrator: fresh cache, upstream, or stale fallback
//!
//! Every read of a `(kind, key)` pair goes through the same sequence:
//!
//! 1. A fresh cache hit is returned as-is.
//! 2. On a miss in background-refresh-only mode, the stale entry (or nothing)
//!    is returned; the read path never calls upstream in that mode.
//! 3. On a miss in interactive mode, the upstream call runs through the retry
//!    executor. Success is written to the cache; failure degrades to the
//!    stale entry, or to nothing.
//!
//! Upstream failures never escape this module; callers get `None` and render
//! the section as unavailable.

use std::future::Future;

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::{Config, DeploymentMode};
use crate::error::UpstreamError;
use crate::retry::RetryExecutor;
use crate::source::SourceAdapter;

/// What a caller gets back from a read
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub payload: T,
    /// Age of the data when it did not come straight from upstream or fresh cache
    pub data_age: Option<Duration>,
    /// True when stale data stands in for a live result
    pub is_fallback: bool,
}

impl<T> FetchOutcome<T> {
    fn live(payload: T) -> Self {
        Self {
            payload,
            data_age: None,
            is_fallback: false,
        }
    }
}

/// Applies the cache/upstream/fallback policy for every data kind
#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    store: CacheStore,
    retry: RetryExecutor,
    mode: DeploymentMode,
}

impl FetchOrchestrator {
    pub fn new(store: CacheStore, retry: RetryExecutor, mode: DeploymentMode) -> Self {
        Self { store, retry, mode }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_store(), config.retry_executor(), config.mode)
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Reads `key`, calling `source_call` (with retries) only when needed
    pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, source_call: F) -> Option<FetchOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        if let Some(entry) = self.store.get_fresh::<T>(key) {
            return Some(FetchOutcome::live(entry.payload));
        }

        if !self.mode.is_interactive() {
            return self.stale(key);
        }

        let label = key.to_string();
        let result = self.retry.run(&label, source_call).await;
        self.settle(key, result)
    }

    /// `fetch` with the adapter's own fetch as the upstream call
    pub async fn fetch_from<T, A>(&self, key: &CacheKey, adapter: &A) -> Option<FetchOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        A: SourceAdapter<T> + ?Sized,
    {
        self.fetch(key, || adapter.fetch(&key.identifier)).await
    }

    /// Same policy for an upstream that retries its own members
    ///
    /// Used for aggregates such as the related-ticker basket, where each
    /// member already went through the retry executor. The future runs at most
    /// once.
    pub async fn fetch_aggregate<T, Fut>(
        &self,
        key: &CacheKey,
        upstream: Fut,
    ) -> Option<FetchOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        if let Some(entry) = self.store.get_fresh::<T>(key) {
            return Some(FetchOutcome::live(entry.payload));
        }

        if !self.mode.is_interactive() {
            return self.stale(key);
        }

        let result = upstream.await;
        self.settle(key, result)
    }

    /// Reads data that has no freshness TTL and is only rebuilt on request
    ///
    /// Any cached entry is served (with its age) unless `force` is set in
    /// interactive mode. In background-refresh-only mode `force` is ignored and
    /// the cached entry, if any, is returned. Generation needs `inputs`; when
    /// they are unavailable nothing is generated and the cached entry, if any,
    /// is returned as a fallback.
    pub async fn fetch_regenerable<T, I, P, F, Fut>(
        &self,
        key: &CacheKey,
        force: bool,
        inputs: P,
        mut generate: F,
    ) -> Option<FetchOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        I: Clone,
        P: Future<Output = Option<I>>,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let interactive = self.mode.is_interactive();
        if force && !interactive {
            info!(
                key = %key,
                "regeneration requested in background-refresh-only mode, serving cache"
            );
        }

        if !(force && interactive) {
            if let Some(entry) = self.store.get_stale::<T>(key) {
                let age = entry.age_at(Utc::now());
                return Some(FetchOutcome {
                    payload: entry.payload,
                    data_age: Some(age),
                    is_fallback: false,
                });
            }
        }

        if !interactive {
            return None;
        }

        let Some(inputs) = inputs.await else {
            warn!(key = %key, "cannot generate, required inputs unavailable");
            return self.stale(key);
        };

        let label = key.to_string();
        let result = self
            .retry
            .run(&label, || generate(inputs.clone()))
            .await;
        self.settle(key, result)
    }

    /// Stores a successful result or degrades a failure to the stale entry
    fn settle<T>(&self, key: &CacheKey, result: Result<T, UpstreamError>) -> Option<FetchOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        match result {
            Ok(payload) => {
                if let Err(err) = self.store.set(key, &payload) {
                    warn!(key = %key, error = %err, "failed to cache upstream result");
                }
                Some(FetchOutcome::live(payload))
            }
            Err(err) => {
                error!(key = %key, error = %err, "upstream request failed");
                self.stale(key)
            }
        }
    }

    fn stale<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<FetchOutcome<T>> {
        let entry = self.store.get_stale::<T>(key)?;
        let age = entry.age_at(Utc::now());
        Some(FetchOutcome {
            payload: entry.payload,
            data_age: Some(age),
            is_fallback: true,
        })
    }
}
