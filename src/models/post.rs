//! Post data structures flowing through the harvest pipeline.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A post as returned by a community listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    /// Listing identifier, unique per source
    pub id: String,

    /// Creation time in epoch seconds
    pub created_utc: i64,

    /// Community (subreddit) name
    pub subreddit: String,

    /// Author name, `None` when deleted or anonymized
    pub author: Option<String>,

    /// Post title
    pub title: String,

    /// Post body (empty for link posts)
    pub selftext: String,

    /// Canonical URL the post points to
    pub url: String,

    /// Absolute permalink to the discussion
    pub permalink: String,

    /// Net vote score
    pub score: i64,

    /// Number of comments
    pub num_comments: u64,
}

impl RawPost {
    /// `created_utc` rendered as RFC 3339 in UTC.
    pub fn created_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.created_utc, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    }

    /// Title and body joined the way they are searched.
    pub fn searchable_text(&self) -> String {
        format!("{}\n{}", self.title, self.selftext)
    }
}

/// A post with its keyword matches and emergency score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPost {
    pub post: RawPost,

    /// Lexicon entries found in the post (and scanned comments)
    pub matched_keywords: BTreeSet<String>,

    /// Marks the post for immediate human review
    pub high_priority: bool,

    /// Heuristic emergency relevance
    pub eas_score: f64,
}

impl ScoredPost {
    /// Whether any lexicon entry matched.
    pub fn is_match(&self) -> bool {
        !self.matched_keywords.is_empty()
    }
}

/// One page of a community listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Posts newer than the window cutoff, newest first
    pub posts: Vec<RawPost>,

    /// Continuation cursor; `None` marks the end of the source
    pub after: Option<String>,
}

impl Page {
    pub fn is_terminal(&self) -> bool {
        self.after.is_none()
    }
}

/// Recency boundary shared by every source of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Run start in epoch seconds
    pub now: i64,

    /// Oldest creation time still inside the window
    pub cutoff: i64,
}

impl FetchWindow {
    /// Build a window reaching `hours` back from `now`.
    pub fn from_hours(hours: u32, now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::hours(i64::from(hours));
        Self {
            now: now.timestamp(),
            cutoff: cutoff.timestamp(),
        }
    }

    /// Window ending at the current wall-clock time.
    pub fn last_hours(hours: u32) -> Self {
        Self::from_hours(hours, Utc::now())
    }

    pub fn contains(&self, created_utc: i64) -> bool {
        created_utc >= self.cutoff
    }

    /// Position of `created_utc` in the window: 1.0 at `now`, 0.0 at the cutoff.
    pub fn freshness(&self, created_utc: i64) -> f64 {
        let span = (self.now - self.cutoff) as f64;
        if span <= 0.0 {
            return 0.0;
        }
        ((created_utc - self.cutoff) as f64 / span).clamp(0.0, 1.0)
    }
}
