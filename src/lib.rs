//! findash library
//!
//! Cache-with-fallback orchestration for stock prices, news and AI insights.
//! The binary in `main.rs` is a thin CLI over these modules; integration
//! tests drive them directly with in-memory providers.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod orchestrator;
pub mod refresh;
pub mod retry;
pub mod service;
pub mod source;
