// src/pipeline/harvest.rs

//! Harvest pipeline: communities -> comment scan -> scorer -> store.

use std::slice;

use crate::error::Result;
use crate::models::{Config, FetchWindow, HarvestConfig};
use crate::pipeline::communities::{CommunityIterator, SourceReport};
use crate::services::{AuthMode, Fetcher, Lexicon, ListingSource, Scorer};
use crate::storage::{CsvStore, PostStore};

const PROGRESS_EVERY: usize = 25;

/// Counters of one harvest run.
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    /// Posts returned by the communities
    pub scanned: usize,
    /// Posts with at least one keyword match
    pub matched: usize,
    /// Posts flagged high priority
    pub high_priority: usize,
    /// Records appended to the store
    pub written: usize,
    /// Posts already present in the store
    pub duplicates: usize,
    /// Posts dropped by the matched-only filter
    pub unmatched_skipped: usize,
    pub sources: SourceReport,
}

impl HarvestSummary {
    fn log(&self) {
        log::info!(
            "Harvest complete: {} scanned, {} matched, {} high priority, {} written, {} already stored",
            self.scanned,
            self.matched,
            self.high_priority,
            self.written,
            self.duplicates
        );
        log::info!(
            "Sources: {} succeeded, {} failed",
            self.sources.succeeded.len(),
            self.sources.failed.len()
        );
        for failure in &self.sources.failed {
            log::warn!("r/{} failed: {}", failure.community, failure.error);
        }
    }
}

/// Run one harvest with the HTTP fetcher and the configured CSV store.
pub async fn run_harvest(config: &Config, mode: AuthMode) -> Result<HarvestSummary> {
    config.validate()?;

    let scorer = Scorer::new(Lexicon::compile(&config.lexicon)?, config.scoring.clone());
    let mut store = CsvStore::open(&config.output.path).await?;
    let mut fetcher = Fetcher::new(&config.fetcher, mode)?;
    fetcher.authenticate().await?;

    let window = FetchWindow::last_hours(config.harvest.hours);
    log::info!(
        "Harvesting {} communities ({} mode), last {}h, up to {} posts each, {} lexicon entries",
        config.harvest.communities.len(),
        if fetcher.is_authenticated() { "authenticated" } else { "public" },
        config.harvest.hours,
        config.harvest.max_per_source,
        scorer.lexicon().len()
    );
    log::info!(
        "Output: {} ({} records already stored)",
        store.path().display(),
        store.len()
    );

    harvest(&mut fetcher, &mut store, &scorer, &config.harvest, window).await
}

/// Drive `source` through every community and append scored posts to `store`.
///
/// Posts already in the store are counted and skipped before any comment
/// request is made for them.
pub async fn harvest<S, W>(
    source: &mut S,
    store: &mut W,
    scorer: &Scorer,
    settings: &HarvestConfig,
    window: FetchWindow,
) -> Result<HarvestSummary>
where
    S: ListingSource + ?Sized,
    W: PostStore + ?Sized,
{
    let mut communities =
        CommunityIterator::new(&settings.communities, window, settings.max_per_source);
    let mut summary = HarvestSummary::default();

    while let Some(post) = communities.next(source).await? {
        summary.scanned += 1;
        if summary.scanned % PROGRESS_EVERY == 0 {
            log::debug!(
                "Progress: {} scanned, {} matched, {} written",
                summary.scanned,
                summary.matched,
                summary.written
            );
        }

        if store.contains(&post.id) {
            summary.duplicates += 1;
            continue;
        }

        let comments = if settings.include_comments && post.num_comments > 0 {
            let community = communities
                .current_community()
                .unwrap_or(post.subreddit.as_str())
                .to_string();
            match source
                .fetch_comments(&community, &post.id, settings.comments_limit)
                .await
            {
                Ok(comments) => comments,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Comments of {} unavailable, scoring title/body only: {}", post.id, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let scored = scorer.score(post, &comments, &window);
        if scored.is_match() {
            summary.matched += 1;
        }
        if scored.high_priority {
            summary.high_priority += 1;
            log::info!(
                "High priority ({:.2}): {} {}",
                scored.eas_score,
                scored.post.title,
                scored.post.permalink
            );
        }

        if settings.matched_only && !scored.is_match() {
            summary.unmatched_skipped += 1;
            continue;
        }

        let written = store.append(slice::from_ref(&scored)).await?;
        summary.written += written.written;
        summary.duplicates += written.skipped;
    }

    summary.sources = communities.into_report();
    summary.log();
    Ok(summary)
}
