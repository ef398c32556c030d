// src/services/scorer.rs

//! Keyword matching and the emergency relevance score.
//!
//! ```text
//! eas = min(keyword_cap, Σ matched weights)
//!     + high_priority_bonus            (high-priority keyword or pattern in title/body)
//!     + recency_weight · freshness     (1 at run start, 0 at the window cutoff)
//!     + min(engagement_cap, comment_weight · ln(1 + comments) + score_weight · ln(1 + max(score, 0)))
//! ```
//!
//! Comment text only widens `matched_keywords` and the high-priority flag; the
//! score itself depends on the post alone.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::models::{FetchWindow, LexiconConfig, RawPost, ScoredPost, ScoringPolicy};
use crate::utils::round2;

#[derive(Debug, Clone)]
struct Entry {
    keyword: String,
    needle: String,
    weight: f64,
    high_priority: bool,
}

/// What one body of text matched.
#[derive(Debug, Default)]
struct Matches {
    keywords: BTreeSet<String>,
    weight: f64,
    high_priority: bool,
}

/// Lexicon ready for case-insensitive matching.
#[derive(Debug, Clone)]
pub struct Lexicon {
    entries: Vec<Entry>,
    patterns: Vec<Regex>,
}

impl Lexicon {
    pub fn compile(config: &LexiconConfig) -> Result<Self> {
        let high_priority: BTreeSet<String> = config
            .high_priority
            .iter()
            .map(|k| k.trim().to_lowercase())
            .collect();

        let entries = config
            .keywords
            .iter()
            .filter(|(keyword, _)| !keyword.trim().is_empty())
            .map(|(keyword, weight)| {
                let needle = keyword.trim().to_lowercase();
                Entry {
                    keyword: keyword.clone(),
                    high_priority: high_priority.contains(&needle),
                    needle,
                    weight: weight.max(0.0),
                }
            })
            .collect();

        let patterns = config
            .high_priority_patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { entries, patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn scan(&self, text: &str) -> Matches {
        let mut matches = Matches::default();
        if text.is_empty() {
            return matches;
        }

        let lowered = text.to_lowercase();
        for entry in &self.entries {
            if lowered.contains(&entry.needle) {
                matches.keywords.insert(entry.keyword.clone());
                matches.weight += entry.weight;
                matches.high_priority |= entry.high_priority;
            }
        }
        matches.high_priority |= self.patterns.iter().any(|p| p.is_match(text));
        matches
    }
}

/// Scores posts against a lexicon under a scoring policy.
#[derive(Debug, Clone)]
pub struct Scorer {
    lexicon: Lexicon,
    policy: ScoringPolicy,
}

impl Scorer {
    pub fn new(lexicon: Lexicon, policy: ScoringPolicy) -> Self {
        Self { lexicon, policy }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Score a post. `comments` are extra searchable text for matching only.
    pub fn score(&self, post: RawPost, comments: &[String], window: &FetchWindow) -> ScoredPost {
        let in_post = self.lexicon.scan(&post.searchable_text());
        let in_comments = self.lexicon.scan(&comments.join("\n"));

        let eas_score = round2(
            self.keyword_term(&in_post)
                + self.recency_term(&post, window)
                + self.engagement_term(&post),
        );

        let high_priority = in_post.high_priority
            || in_comments.high_priority
            || eas_score > self.policy.priority_threshold;

        let mut matched_keywords = in_post.keywords;
        matched_keywords.extend(in_comments.keywords);

        ScoredPost {
            post,
            matched_keywords,
            high_priority,
            eas_score,
        }
    }

    fn keyword_term(&self, matches: &Matches) -> f64 {
        let bonus = if matches.high_priority {
            self.policy.high_priority_bonus
        } else {
            0.0
        };
        matches.weight.min(self.policy.keyword_cap) + bonus
    }

    fn recency_term(&self, post: &RawPost, window: &FetchWindow) -> f64 {
        self.policy.recency_weight * window.freshness(post.created_utc)
    }

    fn engagement_term(&self, post: &RawPost) -> f64 {
        let comments = (post.num_comments as f64).ln_1p();
        let votes = (post.score.max(0) as f64).ln_1p();
        (self.policy.comment_weight * comments + self.policy.score_weight * votes)
            .min(self.policy.engagement_cap)
    }
}
