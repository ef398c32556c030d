//! Service layer for the harvester.
//!
//! This module contains the business logic for:
//! - Listing and comment fetching (`Fetcher`)
//! - Request pacing (`RateLimitState`)
//! - Client-credentials authentication (`TokenProvider`)
//! - Keyword matching and scoring (`Scorer`)

pub mod auth;
mod fetcher;
pub mod rate_limit;
mod scorer;

pub use auth::{AuthMode, Credentials, TokenProvider};
pub use fetcher::{Fetcher, ListingSource};
pub use rate_limit::{QuotaSignal, RateLimitState};
pub use scorer::{Lexicon, Scorer};
