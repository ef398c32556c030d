//! Client-credentials authentication.
//!
//! Authenticated mode trades the app's client id and secret for a bearer token
//! once per run, and again when the token is close to expiry or rejected.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::AuthSetting;

pub const CLIENT_ID_ENV: &str = "REDDIT_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "REDDIT_CLIENT_SECRET";
pub const USER_AGENT_ENV: &str = "REDDIT_USER_AGENT";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// App credentials for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read credentials from `REDDIT_CLIENT_ID` / `REDDIT_CLIENT_SECRET`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary key lookup.
    ///
    /// Both values must be present and non-blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let client_id = non_blank(CLIENT_ID_ENV)?;
        let client_secret = non_blank(CLIENT_SECRET_ENV)?;
        Some(Self::new(client_id.trim(), client_secret.trim()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Resolved authentication mode for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Public,
    Authenticated(Credentials),
}

impl AuthMode {
    /// Combine the configured switch with whatever credentials were found.
    pub fn resolve(setting: AuthSetting, credentials: Option<Credentials>) -> Result<Self> {
        match (setting, credentials) {
            (AuthSetting::Public, _) => Ok(Self::Public),
            (AuthSetting::Auto, None) => Ok(Self::Public),
            (AuthSetting::Auto | AuthSetting::Authenticated, Some(creds)) => {
                Ok(Self::Authenticated(creds))
            }
            (AuthSetting::Authenticated, None) => Err(AppError::auth(format!(
                "authenticated mode requires {CLIENT_ID_ENV} and {CLIENT_SECRET_ENV}"
            ))),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Authenticated(_) => "authenticated",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Caches the bearer token for the lifetime of a run.
#[derive(Debug)]
pub struct TokenProvider {
    credentials: Credentials,
    token_url: String,
    token: Option<AccessToken>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials, token_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            token: None,
        }
    }

    /// Current bearer token, exchanging credentials when none is valid.
    pub async fn bearer(&mut self, client: &Client) -> Result<String> {
        if let Some(token) = &self.token {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
            log::debug!("Access token is about to expire, refreshing");
        }

        let token = self.exchange(client).await?;
        let value = token.value.clone();
        self.token = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call exchanges again.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    async fn exchange(&self, client: &Client) -> Result<AccessToken> {
        let response = client
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::auth(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::auth(format!("token response unreadable: {e}")))?;

        if status != StatusCode::OK {
            return Err(AppError::auth(format!(
                "token endpoint answered {status}: {}",
                body.trim()
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::auth(format!("token response is not JSON: {e}")))?;

        let value = match (parsed.access_token, parsed.error) {
            (Some(token), _) if !token.is_empty() => token,
            (_, Some(error)) => return Err(AppError::auth(format!("token refused: {error}"))),
            _ => return Err(AppError::auth("token response carried no access_token")),
        };

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        log::info!("Obtained access token valid for {}s", lifetime.as_secs());

        Ok(AccessToken {
            value,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}
