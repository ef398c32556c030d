// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Credential exchange failed in authenticated mode
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Listing or comment fetch failed after retries
    #[error("Fetch error for r/{community} (cursor {cursor}): {message}")]
    Fetch {
        community: String,
        cursor: String,
        message: String,
    },

    /// Upstream kept answering 429 until retries ran out
    #[error("Rate limit exceeded for r/{community} (cursor {cursor}) after {attempts} attempts")]
    RateLimitExceeded {
        community: String,
        cursor: String,
        attempts: usize,
    },

    /// Output store could not be written
    #[error("Write error on {path}: {message}")]
    Write { path: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pattern compilation failed
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an authentication error.
    pub fn auth(message: impl fmt::Display) -> Self {
        Self::Auth(message.to_string())
    }

    /// Create a fetch error with the community and cursor it happened on.
    pub fn fetch(
        community: impl Into<String>,
        cursor: Option<&str>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Fetch {
            community: community.into(),
            cursor: cursor.unwrap_or("<start>").to_string(),
            message: message.to_string(),
        }
    }

    /// Create a rate-limit exhaustion error.
    pub fn rate_limited(community: impl Into<String>, cursor: Option<&str>, attempts: usize) -> Self {
        Self::RateLimitExceeded {
            community: community.into(),
            cursor: cursor.unwrap_or("<start>").to_string(),
            attempts,
        }
    }

    /// Create a write error for the given store path.
    pub fn write(path: &Path, message: impl fmt::Display) -> Self {
        Self::Write {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error must abort the whole run.
    ///
    /// Fetch and rate-limit failures only cost the current source.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Fetch { .. } | Self::RateLimitExceeded { .. })
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Write { .. } => 2,
            Self::Auth(_) => 3,
            _ => 1,
        }
    }
}
