//! Upstream listing payloads.
//!
//! Mirrors the subset of the Reddit "thing" envelope the harvester reads:
//!
//! ```text
//! { "kind": "Listing", "data": { "after": "t3_xyz", "children": [ { "kind": "t3", "data": { .. } } ] } }
//! ```

use serde::Deserialize;
use url::Url;

use crate::models::RawPost;
use crate::utils::resolve_url;

/// Kind tag of a link post.
pub const POST_KIND: &str = "t3";

/// Kind tag of a comment.
pub const COMMENT_KIND: &str = "t1";

#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct ListingData<T> {
    #[serde(default)]
    pub after: Option<String>,

    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

/// Post fields as sent by the listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostData {
    pub id: String,
    pub created_utc: f64,
    pub subreddit: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub score: Option<i64>,
    pub num_comments: Option<u64>,
}

impl PostData {
    /// Convert into a `RawPost`, resolving the permalink against `base`.
    pub fn into_raw_post(self, base: &Url) -> RawPost {
        let permalink = self
            .permalink
            .as_deref()
            .map(|p| resolve_url(base, p))
            .unwrap_or_default();

        RawPost {
            id: self.id,
            created_utc: self.created_utc as i64,
            subreddit: self.subreddit,
            author: self.author.filter(|a| !a.is_empty()),
            title: self.title.unwrap_or_default(),
            selftext: self.selftext.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            permalink,
            score: self.score.unwrap_or(0),
            num_comments: self.num_comments.unwrap_or(0),
        }
    }
}

/// Comment fields; "more" stubs deserialize with an empty body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentData {
    pub body: String,
}

/// The comments endpoint answers `[post_listing, comment_listing]`.
pub type CommentThread = (serde_json::Value, Listing<CommentData>);
