//! Storage abstractions for harvested posts.
//!
//! Records accumulate across runs in a single CSV file. Each run loads the
//! identifiers already present and appends only unseen posts:
//!
//! ```text
//! id,created_utc,created_iso,subreddit,author,title,selftext,url,permalink,score,num_comments,matched_keywords,high_priority,eas_score
//! 1abcd2,1700000000,2023-11-14T22:13:20Z,AlexandriaVA,neighbor,Fire on Duke St,,https://..,https://..,12,4,fire;Duke St,false,9.87
//! ```

pub mod csv_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ScoredPost;

pub use csv_store::{CsvStore, StoreStats};

/// Column order of the output file.
pub const OUTPUT_FIELDS: [&str; 14] = [
    "id",
    "created_utc",
    "created_iso",
    "subreddit",
    "author",
    "title",
    "selftext",
    "url",
    "permalink",
    "score",
    "num_comments",
    "matched_keywords",
    "high_priority",
    "eas_score",
];

/// Separator used inside the `matched_keywords` column.
pub const KEYWORD_SEPARATOR: &str = ";";

/// One flattened output row. Field order must match [`OUTPUT_FIELDS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: String,
    pub created_utc: i64,
    pub created_iso: String,
    pub subreddit: String,
    pub author: Option<String>,
    pub title: String,
    pub selftext: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub num_comments: u64,
    pub matched_keywords: String,
    pub high_priority: bool,
    pub eas_score: f64,
}

impl From<&ScoredPost> for OutputRecord {
    fn from(scored: &ScoredPost) -> Self {
        let post = &scored.post;
        Self {
            id: post.id.clone(),
            created_utc: post.created_utc,
            created_iso: post.created_iso(),
            subreddit: post.subreddit.clone(),
            author: post.author.clone(),
            title: post.title.clone(),
            selftext: post.selftext.clone(),
            url: post.url.clone(),
            permalink: post.permalink.clone(),
            score: post.score,
            num_comments: post.num_comments,
            matched_keywords: scored
                .matched_keywords
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(KEYWORD_SEPARATOR),
            high_priority: scored.high_priority,
            eas_score: scored.eas_score,
        }
    }
}

/// Outcome of one append call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records appended
    pub written: usize,
    /// Records skipped because their id was already stored
    pub skipped: usize,
}

/// Trait for deduplicating post stores.
#[async_trait]
pub trait PostStore: Send {
    /// Append posts whose id is not yet stored, in input order.
    async fn append(&mut self, posts: &[ScoredPost]) -> Result<WriteSummary>;

    /// Whether a record with this id is already stored.
    fn contains(&self, id: &str) -> bool;

    /// Number of distinct ids stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
