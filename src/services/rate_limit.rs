//! Request pacing driven by server-advertised quotas.
//!
//! The state is owned by a single fetcher and updated explicitly around every
//! request, so pacing decisions can be checked without any network traffic.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;

use crate::utils::http::header_f64;

/// Requests left in the current quota period.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Seconds until the quota period resets.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota advertised by the most recent response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaSignal {
    pub remaining: f64,
    pub reset: Duration,
}

impl QuotaSignal {
    /// Parse the quota headers; both must be present and sane.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_f64(headers, REMAINING_HEADER)?;
        let reset = header_f64(headers, RESET_HEADER)?;
        let reset = Duration::try_from_secs_f64(reset).ok()?;
        Some(Self {
            remaining: remaining.max(0.0),
            reset,
        })
    }

    /// Spacing that spreads the remaining quota evenly over the reset period.
    ///
    /// An exhausted quota means waiting for the whole reset period.
    pub fn spacing(&self) -> Duration {
        if self.remaining < 1.0 {
            self.reset
        } else {
            self.reset.div_f64(self.remaining)
        }
    }
}

/// Pacing state carried between requests.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    default_interval: Duration,
    last_request: Option<Instant>,
    quota: Option<(QuotaSignal, Instant)>,
}

impl RateLimitState {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            last_request: None,
            quota: None,
        }
    }

    /// Note that a request was sent at `at`.
    pub fn record_request(&mut self, at: Instant) {
        self.last_request = Some(at);
    }

    /// Note the quota headers of a response received at `at`.
    ///
    /// A response without quota headers clears the previous signal.
    pub fn record_response(&mut self, headers: &HeaderMap, at: Instant) {
        self.quota = QuotaSignal::from_headers(headers).map(|signal| (signal, at));
    }

    /// Latest quota signal, if the last response carried one.
    pub fn quota(&self) -> Option<QuotaSignal> {
        self.quota.map(|(signal, _)| signal)
    }

    /// `max(0, default_interval, computed_from_quota)`.
    pub fn min_interval(&self) -> Duration {
        let from_quota = self.quota().map(|q| q.spacing()).unwrap_or(Duration::ZERO);
        self.default_interval.max(from_quota)
    }

    /// Earliest instant the next request may be sent.
    pub fn ready_at(&self) -> Option<Instant> {
        let by_default = self
            .last_request
            .and_then(|t| t.checked_add(self.default_interval));
        let by_quota = self
            .quota
            .and_then(|(signal, at)| at.checked_add(signal.spacing()));
        by_default.max(by_quota)
    }

    /// How long to sleep at `now` before the next request.
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.ready_at()
            .map(|ready| ready.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
