// src/pipeline/communities.rs

//! Drives a listing source across the configured communities.

use std::collections::VecDeque;

use crate::error::Result;
use crate::models::{FetchWindow, RawPost};
use crate::services::ListingSource;

/// Where pagination of the current community stands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Progress {
    Fresh,
    Continue(String),
    Exhausted,
}

#[derive(Debug)]
struct Cursor {
    community: String,
    progress: Progress,
    taken: usize,
}

impl Cursor {
    fn new(community: String) -> Self {
        Self {
            community,
            progress: Progress::Fresh,
            taken: 0,
        }
    }

    fn after(&self) -> Option<&str> {
        match &self.progress {
            Progress::Continue(after) => Some(after),
            _ => None,
        }
    }
}

/// A community that was abandoned after a recoverable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub community: String,
    pub error: String,
}

/// Per-community outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<SourceFailure>,
}

impl SourceReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Yields posts community by community, newest first within each.
///
/// Nothing is fetched until [`next`](Self::next) is called. A community whose
/// fetch fails is recorded in the [`SourceReport`] and skipped; fatal errors
/// propagate to the caller.
#[derive(Debug)]
pub struct CommunityIterator {
    pending: VecDeque<String>,
    window: FetchWindow,
    max_per_source: usize,
    current: Option<Cursor>,
    buffer: VecDeque<RawPost>,
    report: SourceReport,
}

impl CommunityIterator {
    pub fn new<I, S>(communities: I, window: FetchWindow, max_per_source: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pending = communities
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Self {
            pending,
            window,
            max_per_source,
            current: None,
            buffer: VecDeque::new(),
            report: SourceReport::default(),
        }
    }

    /// Community of the post most recently returned, if one is in progress.
    pub fn current_community(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.community.as_str())
    }

    pub fn report(&self) -> &SourceReport {
        &self.report
    }

    pub fn into_report(self) -> SourceReport {
        self.report
    }

    /// Next post, or `None` once every community is done.
    pub async fn next<S>(&mut self, source: &mut S) -> Result<Option<RawPost>>
    where
        S: ListingSource + ?Sized,
    {
        loop {
            if let Some(post) = self.buffer.pop_front() {
                return Ok(Some(post));
            }

            let Some(cursor) = self.current.as_mut() else {
                match self.pending.pop_front() {
                    Some(community) => {
                        log::info!("Scanning r/{}", community);
                        self.current = Some(Cursor::new(community));
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            if cursor.progress == Progress::Exhausted || cursor.taken >= self.max_per_source {
                self.finish_source();
                continue;
            }

            let remaining = self.max_per_source - cursor.taken;
            let page = source
                .fetch_page(&cursor.community, cursor.after(), &self.window, remaining)
                .await;

            match page {
                Ok(page) => {
                    let window = self.window;
                    let posts: Vec<RawPost> = page
                        .posts
                        .into_iter()
                        .filter(|p| window.contains(p.created_utc))
                        .take(remaining)
                        .collect();

                    cursor.taken += posts.len();
                    cursor.progress = match page.after {
                        Some(after) if !posts.is_empty() => Progress::Continue(after),
                        _ => Progress::Exhausted,
                    };
                    self.buffer.extend(posts);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Skipping r/{}: {}", cursor.community, e);
                    self.report.failed.push(SourceFailure {
                        community: cursor.community.clone(),
                        error: e.to_string(),
                    });
                    self.current = None;
                }
            }
        }
    }

    fn finish_source(&mut self) {
        if let Some(cursor) = self.current.take() {
            log::info!("r/{}: {} posts in window", cursor.community, cursor.taken);
            self.report.succeeded.push(cursor.community);
        }
    }
}
