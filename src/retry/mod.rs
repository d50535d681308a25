//! Retry support for upstream calls
//!
//! `BackoffPolicy` classifies failures and computes delays; `RetryExecutor`
//! composes it around any async operation.

mod backoff;
mod executor;

pub use backoff::BackoffPolicy;
pub use executor::RetryExecutor;
