//! Cache module for storing upstream responses to disk
//!
//! This module provides a store that persists responses to the filesystem with
//! a freshness TTL and a longer retention window. Expired entries can still be
//! read as fallbacks, which lets the orchestrator serve stale data when an
//! upstream is unavailable.

mod store;

pub use store::{format_age, CacheEntry, CacheKey, CacheKind, CacheStore, Origin};
