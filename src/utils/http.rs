// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::Result;
use crate::models::FetcherConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Read a numeric header such as `x-ratelimit-remaining: 598.0`.
pub fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// `Retry-After` expressed in seconds, if present.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_f64(headers, RETRY_AFTER.as_str())
        .filter(|secs| *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
