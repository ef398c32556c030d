//! In-memory listing source for pipeline tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{FetchWindow, Page, RawPost};
use crate::services::ListingSource;

pub const NOW: i64 = 1_700_000_000;
pub const HOUR: i64 = 3600;

/// 24 hour window ending at [`NOW`].
pub fn window() -> FetchWindow {
    FetchWindow {
        now: NOW,
        cutoff: NOW - 24 * HOUR,
    }
}

pub fn post(community: &str, id: &str, age_hours: i64) -> RawPost {
    RawPost {
        id: id.to_string(),
        created_utc: NOW - age_hours * HOUR,
        subreddit: community.to_string(),
        author: Some("resident".to_string()),
        title: format!("Post {id}"),
        selftext: String::new(),
        url: format!("https://example.com/{id}"),
        permalink: format!("https://reddit.com/r/{community}/comments/{id}/"),
        score: 1,
        num_comments: 0,
    }
}

/// Serves canned pages; cursors are `"{community}:{page}"`.
#[derive(Debug, Default)]
pub struct FakeSource {
    pages: HashMap<String, Vec<Vec<RawPost>>>,
    comments: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    unauthorized: HashSet<String>,
    failing_comments: bool,
    requests: Vec<(String, Option<String>, usize)>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, community: &str, pages: Vec<Vec<RawPost>>) -> Self {
        self.pages.insert(community.to_string(), pages);
        self
    }

    pub fn with_comments(mut self, post_id: &str, comments: &[&str]) -> Self {
        self.comments.insert(
            post_id.to_string(),
            comments.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, community: &str) -> Self {
        self.failing.insert(community.to_string());
        self
    }

    pub fn unauthorized(mut self, community: &str) -> Self {
        self.unauthorized.insert(community.to_string());
        self
    }

    pub fn failing_comments(mut self) -> Self {
        self.failing_comments = true;
        self
    }

    /// Number of page requests served.
    pub fn calls(&self) -> usize {
        self.requests.len()
    }

    pub fn requested_limits(&self, community: &str) -> Vec<usize> {
        self.requests
            .iter()
            .filter(|(c, _, _)| c == community)
            .map(|(_, _, limit)| *limit)
            .collect()
    }
}

#[async_trait]
impl ListingSource for FakeSource {
    async fn fetch_page(
        &mut self,
        community: &str,
        after: Option<&str>,
        _window: &FetchWindow,
        limit: usize,
    ) -> Result<Page> {
        self.requests
            .push((community.to_string(), after.map(String::from), limit));

        if self.unauthorized.contains(community) {
            return Err(AppError::auth("token refused"));
        }
        if self.failing.contains(community) {
            return Err(AppError::fetch(community, after, "HTTP 503 after 4 attempts"));
        }

        let index = after
            .and_then(|a| a.rsplit(':').next())
            .and_then(|i| i.parse::<usize>().ok())
            .unwrap_or(0);
        let pages = self.pages.get(community).cloned().unwrap_or_default();
        let posts: Vec<RawPost> = pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect();
        let after = (index + 1 < pages.len()).then(|| format!("{community}:{}", index + 1));

        Ok(Page { posts, after })
    }

    async fn fetch_comments(
        &mut self,
        community: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        if self.failing_comments {
            return Err(AppError::fetch(community, Some(post_id), "HTTP 500"));
        }
        Ok(self
            .comments
            .get(post_id)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
