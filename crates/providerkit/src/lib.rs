//! # providerkit
//!
//! Transport helpers shared by provider implementations.
//!
//! This crate provides functionality for:
//! - Classifying provider failures (network, throttling, server, client)
//! - Retrying transient failures with exponential backoff and jitter
//!
//! ## Retry Logic
//!
//! Network errors, `429` and `5xx` responses are retried with exponential
//! backoff. Every other failure is returned to the caller unchanged.
//!
//! ```no_run
//! use providerkit::{RetryConfig, retry};
//! use std::time::Duration;
//!
//! # async fn fetch() -> providerkit::Result<String> { Ok(String::new()) }
//! # async fn run() -> providerkit::Result<()> {
//! let config = RetryConfig::new(4, Duration::from_millis(250), 2.0);
//! let body = retry::with_retry(&config, Some(&retry::LogCallback), fetch).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Custom error types plug in through [`retry::with_backoff`], which takes
//! the retry predicate explicitly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod retry;
pub mod types;

pub use error::{Error, ErrorCategory, Result, is_retryable_status};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_backoff, with_retry};
pub use types::RetryConfig;
