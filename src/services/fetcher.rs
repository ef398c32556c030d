// src/services/fetcher.rs

//! Rate-limited listing fetcher.
//!
//! Pages through a community's "newest first" listing, honoring the quota
//! headers of the last response and retrying transient failures on the
//! exponential schedule of a [`reqwest_retry`] policy. Public and
//! authenticated modes differ only in the base URL and the bearer token
//! attached to each request.

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{
    Jitter, RetryDecision, RetryPolicy, Retryable, default_on_request_failure,
    default_on_request_success,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::listing::{
    COMMENT_KIND, CommentThread, Listing, POST_KIND, PostData,
};
use crate::models::{FetchWindow, FetcherConfig, Page};
use crate::services::auth::{AuthMode, TokenProvider};
use crate::services::rate_limit::RateLimitState;
use crate::utils::endpoint;
use crate::utils::http::{create_async_client, retry_after};

/// Narrow contract between the pipeline and an upstream listing.
#[async_trait]
pub trait ListingSource: Send {
    /// Fetch the page after `after` (or the first page), keeping only posts
    /// inside `window`. `limit` bounds the number of items requested.
    async fn fetch_page(
        &mut self,
        community: &str,
        after: Option<&str>,
        window: &FetchWindow,
        limit: usize,
    ) -> Result<Page>;

    /// Fetch up to `limit` top-level comment bodies of a post.
    async fn fetch_comments(
        &mut self,
        community: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<String>>;
}

/// Why a request is worth repeating.
struct Retry {
    reason: String,
    rate_limited: bool,
    wait_hint: Option<Duration>,
}

impl Retry {
    fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            rate_limited: false,
            wait_hint: None,
        }
    }
}

/// Outcome of one request.
enum Attempt<T> {
    Done(T),
    Again(Retry),
}

/// Backoff schedule: `initial * 2^n`, capped at `max`, without jitter.
fn backoff_policy(config: &FetcherConfig) -> ExponentialBackoff {
    let initial = Duration::from_millis(config.initial_backoff_ms);
    let max = Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms));
    ExponentialBackoff::builder()
        .retry_bounds(initial, max)
        .jitter(Jitter::None)
        .build_with_max_retries(u32::try_from(config.max_retries).unwrap_or(u32::MAX))
}

/// HTTP implementation of [`ListingSource`].
pub struct Fetcher {
    client: Client,
    base_url: String,
    permalink_base: Url,
    page_size: usize,
    backoff: ExponentialBackoff,
    tokens: Option<TokenProvider>,
    rate: RateLimitState,
}

impl Fetcher {
    /// Create a fetcher for the given mode.
    pub fn new(config: &FetcherConfig, mode: AuthMode) -> Result<Self> {
        let client = create_async_client(config)?;
        let (base_url, tokens) = match mode {
            AuthMode::Public => (config.public_base_url.clone(), None),
            AuthMode::Authenticated(credentials) => (
                config.oauth_base_url.clone(),
                Some(TokenProvider::new(credentials, config.token_url.clone())),
            ),
        };

        Ok(Self {
            client,
            base_url,
            permalink_base: Url::parse(&config.permalink_base)?,
            page_size: config.page_size.clamp(1, 100),
            backoff: backoff_policy(config),
            tokens,
            rate: RateLimitState::new(Duration::from_millis(config.request_delay_ms)),
        })
    }

    /// Pacing state after the most recent request.
    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Obtain a bearer token up front so credential problems surface before any listing.
    pub async fn authenticate(&mut self) -> Result<()> {
        if let Some(tokens) = self.tokens.as_mut() {
            tokens.bearer(&self.client).await?;
        }
        Ok(())
    }

    /// Sleep until the pacing state allows another request.
    async fn throttle(&self) {
        let wait = self.rate.wait_time(Instant::now());
        if !wait.is_zero() {
            log::debug!("Rate limit: sleeping {:?} before next request", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Send one GET and classify the outcome.
    ///
    /// 429, 5xx, connection failures and a body that breaks off or does not
    /// decode are transient. A 401 in authenticated mode drops the cached
    /// token and is transient too. Any other status fails at once.
    async fn attempt<T: DeserializeOwned>(
        &mut self,
        url: &Url,
        community: &str,
        cursor: Option<&str>,
    ) -> Result<Attempt<T>> {
        self.throttle().await;

        let mut request = self.client.get(url.clone());
        if let Some(tokens) = self.tokens.as_mut() {
            request = request.bearer_auth(tokens.bearer(&self.client).await?);
        }

        log::debug!("GET {}", url);
        self.rate.record_request(Instant::now());

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = reqwest_middleware::Error::Reqwest(e);
                return match default_on_request_failure(&error) {
                    Some(Retryable::Transient) => {
                        Ok(Attempt::Again(Retry::transient(error.to_string())))
                    }
                    _ => Err(AppError::fetch(community, cursor, error)),
                };
            }
        };
        self.rate.record_response(response.headers(), Instant::now());

        let status = response.status();
        match default_on_request_success(&response) {
            None => Ok(decode(response).await),
            Some(Retryable::Fatal) if status == StatusCode::UNAUTHORIZED => {
                match self.tokens.as_mut() {
                    Some(tokens) => {
                        tokens.invalidate();
                        Ok(Attempt::Again(Retry::transient("HTTP 401, token rejected")))
                    }
                    None => Err(AppError::fetch(community, cursor, format!("HTTP {status}"))),
                }
            }
            Some(Retryable::Fatal) => {
                Err(AppError::fetch(community, cursor, format!("HTTP {status}")))
            }
            Some(Retryable::Transient) => Ok(Attempt::Again(Retry {
                reason: format!("HTTP {status}"),
                rate_limited: status == StatusCode::TOO_MANY_REQUESTS,
                wait_hint: retry_after(response.headers()),
            })),
        }
    }

    /// GET `url` and decode the JSON body, retrying transient failures
    /// until the backoff policy gives up.
    async fn get_json<T: DeserializeOwned>(
        &mut self,
        url: Url,
        community: &str,
        cursor: Option<&str>,
    ) -> Result<T> {
        let started = SystemTime::now();
        let mut past_retries: u32 = 0;

        loop {
            let retry = match self.attempt(&url, community, cursor).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Again(retry) => retry,
            };
            let attempts = past_retries as usize + 1;

            let execute_after = match self.backoff.should_retry(started, past_retries) {
                RetryDecision::Retry { execute_after } => execute_after,
                RetryDecision::DoNotRetry => {
                    log::error!(
                        "Giving up on r/{} after {} attempts: {}",
                        community,
                        attempts,
                        retry.reason
                    );
                    return Err(if retry.rate_limited {
                        AppError::rate_limited(community, cursor, attempts)
                    } else {
                        AppError::fetch(
                            community,
                            cursor,
                            format!("{} after {} attempts", retry.reason, attempts),
                        )
                    });
                }
            };

            let backoff = execute_after
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO);
            let wait = backoff.max(retry.wait_hint.unwrap_or(Duration::ZERO));
            log::warn!(
                "r/{}: {} (attempt {}), backing off {:?}",
                community,
                retry.reason,
                attempts,
                wait
            );
            tokio::time::sleep(wait).await;
            past_retries += 1;
        }
    }
}

/// Read and decode a successful response. A body that breaks off mid-transfer
/// or is not the expected JSON is worth another attempt.
async fn decode<T: DeserializeOwned>(response: Response) -> Attempt<T> {
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Attempt::Again(Retry::transient(format!("incomplete body: {e}"))),
    };
    match serde_json::from_str(&body) {
        Ok(value) => Attempt::Done(value),
        Err(e) => Attempt::Again(Retry::transient(format!("malformed response: {e}"))),
    }
}

#[async_trait]
impl ListingSource for Fetcher {
    async fn fetch_page(
        &mut self,
        community: &str,
        after: Option<&str>,
        window: &FetchWindow,
        limit: usize,
    ) -> Result<Page> {
        let mut url = endpoint(&self.base_url, &["r", community, "new.json"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &limit.clamp(1, self.page_size).to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }

        let listing: Listing<PostData> = self.get_json(url, community, after).await?;
        let had_children = !listing.data.children.is_empty();

        let mut posts = Vec::with_capacity(listing.data.children.len());
        let mut reached_cutoff = false;
        for child in listing.data.children {
            if child.kind != POST_KIND {
                continue;
            }
            let post = child.data.into_raw_post(&self.permalink_base);
            if !window.contains(post.created_utc) {
                log::debug!("r/{}: reached posts older than the window", community);
                reached_cutoff = true;
                break;
            }
            posts.push(post);
        }

        let next = if reached_cutoff || !had_children {
            None
        } else {
            listing.data.after.filter(|a| !a.is_empty())
        };

        log::debug!(
            "r/{}: page after {:?} kept {} posts",
            community,
            after,
            posts.len()
        );
        Ok(Page { posts, after: next })
    }

    async fn fetch_comments(
        &mut self,
        community: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let file = format!("{post_id}.json");
        let mut url = endpoint(&self.base_url, &["r", community, "comments", &file])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("depth", "1")
            .append_pair("sort", "new")
            .append_pair("raw_json", "1");

        let (_, thread): CommentThread = self.get_json(url, community, Some(post_id)).await?;

        Ok(thread
            .data
            .children
            .into_iter()
            .filter(|c| c.kind == COMMENT_KIND)
            .map(|c| c.data.body)
            .filter(|body| !body.trim().is_empty())
            .take(limit)
            .collect())
    }
}
