//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP, authentication and rate-limit settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Which communities to scan and how far back
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Keyword lexicon
    #[serde(default)]
    pub lexicon: LexiconConfig,

    /// Score weighting constants
    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Output store settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.page_size == 0 || self.fetcher.page_size > 100 {
            return Err(AppError::validation(
                "fetcher.page_size must be between 1 and 100",
            ));
        }
        if self.harvest.hours == 0 {
            return Err(AppError::validation("harvest.hours must be > 0"));
        }
        if self.harvest.max_per_source == 0 {
            return Err(AppError::validation("harvest.max_per_source must be > 0"));
        }
        if self.harvest.communities.iter().all(|c| c.trim().is_empty()) {
            return Err(AppError::validation("No communities defined"));
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(AppError::validation("output.path is empty"));
        }
        self.lexicon.validate()?;
        self.scoring.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            harvest: HarvestConfig::default(),
            lexicon: LexiconConfig::default(),
            scoring: ScoringPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

/// How requests are authenticated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthSetting {
    /// Authenticated when credentials are present, public otherwise
    #[default]
    Auto,
    /// Always use the unauthenticated JSON endpoints
    Public,
    /// Require client credentials
    Authenticated,
}

/// HTTP client, authentication and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Authentication mode switch
    #[serde(default)]
    pub auth: AuthSetting,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: usize,

    /// First backoff delay in milliseconds, doubled per retry
    #[serde(default = "defaults::initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_ms: u64,

    /// Items requested per listing page (upstream maximum is 100)
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Base URL for unauthenticated requests
    #[serde(default = "defaults::public_base_url")]
    pub public_base_url: String,

    /// Base URL for bearer-token requests
    #[serde(default = "defaults::oauth_base_url")]
    pub oauth_base_url: String,

    /// Client-credentials token endpoint
    #[serde(default = "defaults::token_url")]
    pub token_url: String,

    /// Base that relative permalinks are resolved against
    #[serde(default = "defaults::permalink_base")]
    pub permalink_base: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            auth: AuthSetting::default(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_retries: defaults::max_retries(),
            initial_backoff_ms: defaults::initial_backoff(),
            max_backoff_ms: defaults::max_backoff(),
            page_size: defaults::page_size(),
            public_base_url: defaults::public_base_url(),
            oauth_base_url: defaults::oauth_base_url(),
            token_url: defaults::token_url(),
            permalink_base: defaults::permalink_base(),
        }
    }
}

/// Run parameters for one harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Communities scanned in order
    #[serde(default = "defaults::communities")]
    pub communities: Vec<String>,

    /// Recency window in hours
    #[serde(default = "defaults::hours")]
    pub hours: u32,

    /// Cap on posts taken from one community
    #[serde(default = "defaults::max_per_source")]
    pub max_per_source: usize,

    /// Also search top-level comments
    #[serde(default)]
    pub include_comments: bool,

    /// Comments read per post when scanning comments
    #[serde(default = "defaults::comments_limit")]
    pub comments_limit: usize,

    /// Only write posts that matched at least one keyword
    #[serde(default = "defaults::matched_only")]
    pub matched_only: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            communities: defaults::communities(),
            hours: defaults::hours(),
            max_per_source: defaults::max_per_source(),
            include_comments: false,
            comments_limit: defaults::comments_limit(),
            matched_only: defaults::matched_only(),
        }
    }
}

/// Keyword lexicon as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// Keyword or phrase to weight
    #[serde(default = "defaults::keywords")]
    pub keywords: BTreeMap<String, f64>,

    /// Keywords that flag a post as high priority on their own
    #[serde(default = "defaults::high_priority")]
    pub high_priority: Vec<String>,

    /// Case-insensitive regexes that flag a post as high priority
    #[serde(default = "defaults::high_priority_patterns")]
    pub high_priority_patterns: Vec<String>,
}

impl LexiconConfig {
    /// Keywords are matched case-insensitively, so they are compared here in
    /// their trimmed lowercase form.
    fn validate(&self) -> Result<()> {
        let mut needles: BTreeMap<String, &str> = BTreeMap::new();
        for (keyword, weight) in &self.keywords {
            let needle = keyword.trim().to_lowercase();
            if needle.is_empty() {
                return Err(AppError::validation("lexicon contains an empty keyword"));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(AppError::validation(format!(
                    "lexicon weight for '{keyword}' must be finite and >= 0"
                )));
            }
            if let Some(other) = needles.insert(needle, keyword) {
                return Err(AppError::validation(format!(
                    "lexicon keywords '{other}' and '{keyword}' differ only by case or spacing"
                )));
            }
        }
        for keyword in &self.high_priority {
            if !needles.contains_key(&keyword.trim().to_lowercase()) {
                return Err(AppError::validation(format!(
                    "high-priority keyword '{keyword}' is not in the lexicon"
                )));
            }
        }
        for pattern in &self.high_priority_patterns {
            Regex::new(pattern).map_err(|e| {
                AppError::validation(format!("invalid high-priority pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            keywords: defaults::keywords(),
            high_priority: defaults::high_priority(),
            high_priority_patterns: defaults::high_priority_patterns(),
        }
    }
}

/// Tunable constants of the emergency score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringPolicy {
    /// Ceiling on the summed keyword weights
    #[serde(default = "defaults::keyword_cap")]
    pub keyword_cap: f64,

    /// Added once when a high-priority keyword or pattern matches
    #[serde(default = "defaults::high_priority_bonus")]
    pub high_priority_bonus: f64,

    /// Bonus for a post created at the start of the run, decaying to 0 at the cutoff
    #[serde(default = "defaults::recency_weight")]
    pub recency_weight: f64,

    /// Multiplier on ln(1 + comments)
    #[serde(default = "defaults::comment_weight")]
    pub comment_weight: f64,

    /// Multiplier on ln(1 + max(score, 0))
    #[serde(default = "defaults::score_weight")]
    pub score_weight: f64,

    /// Ceiling on the engagement term
    #[serde(default = "defaults::engagement_cap")]
    pub engagement_cap: f64,

    /// Scores above this mark the post high priority
    #[serde(default = "defaults::priority_threshold")]
    pub priority_threshold: f64,
}

impl ScoringPolicy {
    fn validate(&self) -> Result<()> {
        let constants = [
            ("keyword_cap", self.keyword_cap),
            ("high_priority_bonus", self.high_priority_bonus),
            ("recency_weight", self.recency_weight),
            ("comment_weight", self.comment_weight),
            ("score_weight", self.score_weight),
            ("engagement_cap", self.engagement_cap),
            ("priority_threshold", self.priority_threshold),
        ];
        for (name, value) in constants {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::validation(format!(
                    "scoring.{name} must be finite and >= 0"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            keyword_cap: defaults::keyword_cap(),
            high_priority_bonus: defaults::high_priority_bonus(),
            recency_weight: defaults::recency_weight(),
            comment_weight: defaults::comment_weight(),
            score_weight: defaults::score_weight(),
            engagement_cap: defaults::engagement_cap(),
            priority_threshold: defaults::priority_threshold(),
        }
    }
}

/// Output store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV file that accumulates records across runs
    #[serde(default = "defaults::output_path")]
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: defaults::output_path(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    // Fetcher defaults
    pub fn user_agent() -> String {
        "incident-harvester/0.1 (community incident triage)".into()
    }
    pub fn timeout() -> u64 {
        12
    }
    pub fn request_delay() -> u64 {
        600
    }
    pub fn max_retries() -> usize {
        3
    }
    pub fn initial_backoff() -> u64 {
        2_000
    }
    pub fn max_backoff() -> u64 {
        30_000
    }
    pub fn page_size() -> usize {
        100
    }
    pub fn public_base_url() -> String {
        "https://www.reddit.com".into()
    }
    pub fn oauth_base_url() -> String {
        "https://oauth.reddit.com".into()
    }
    pub fn token_url() -> String {
        "https://www.reddit.com/api/v1/access_token".into()
    }
    pub fn permalink_base() -> String {
        "https://reddit.com".into()
    }

    // Harvest defaults
    pub fn communities() -> Vec<String> {
        ["AlexandriaVA", "nova", "ArlingtonVA", "washingtondc"]
            .into_iter()
            .map(String::from)
            .collect()
    }
    pub fn hours() -> u32 {
        48
    }
    pub fn max_per_source() -> usize {
        300
    }
    pub fn comments_limit() -> usize {
        20
    }
    pub fn matched_only() -> bool {
        true
    }

    // Lexicon defaults
    const INCIDENT_KEYWORDS: &[&str] = &[
        "fire",
        "smoke",
        "explosion",
        "gas leak",
        "evacuation",
        "hazmat",
        "shelter in place",
        "shooting",
        "shots fired",
        "stabbing",
        "assault",
        "accident",
        "crash",
        "pileup",
        "hit and run",
        "flood",
        "flash flood",
        "water main",
        "sinkhole",
        "power outage",
        "downed lines",
        "transformer",
        "road closed",
        "bridge closed",
        "police activity",
        "sirens",
        "helicopter",
        "medevac",
    ];

    const PLACE_ANCHORS: &[&str] = &[
        "Del Ray",
        "Old Town",
        "Potomac Yard",
        "Eisenhower",
        "King St",
        "Duke St",
        "Van Dorn",
        "Seminary",
        "Beauregard",
        "Landmark",
        "Cameron",
        "Slaters",
        "Huntington",
        "Fairfax County",
        "Arlandria",
        "Rosemont",
        "North Ridge",
        "West End",
    ];

    pub fn keywords() -> BTreeMap<String, f64> {
        let mut map: BTreeMap<String, f64> = INCIDENT_KEYWORDS
            .iter()
            .map(|k| (k.to_string(), 1.5))
            .collect();
        map.extend(PLACE_ANCHORS.iter().map(|k| (k.to_string(), 0.5)));
        map.insert("Alexandria".into(), 3.0);
        map
    }
    pub fn high_priority() -> Vec<String> {
        [
            "shooting",
            "shots fired",
            "stabbing",
            "explosion",
            "hazmat",
            "shelter in place",
            "pileup",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
    pub fn high_priority_patterns() -> Vec<String> {
        vec![
            r"\b(major\s+accident|multi-vehicle\s+crash)\b".into(),
            r"\b(active\s+police\s+activity|police\s+blocked|crime\s+scene)\b".into(),
            r"\b(large\s+fire|structure\s+fire|apartment\s+fire)\b".into(),
        ]
    }

    // Scoring defaults
    pub fn keyword_cap() -> f64 {
        15.0
    }
    pub fn high_priority_bonus() -> f64 {
        10.0
    }
    pub fn recency_weight() -> f64 {
        3.0
    }
    pub fn comment_weight() -> f64 {
        1.0
    }
    pub fn score_weight() -> f64 {
        0.5
    }
    pub fn engagement_cap() -> f64 {
        5.0
    }
    pub fn priority_threshold() -> f64 {
        20.0
    }

    // Output defaults
    pub fn output_path() -> PathBuf {
        PathBuf::from("data/alx_reddit.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetcher.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_page() {
        let mut config = Config::default();
        config.fetcher.page_size = 250;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_high_priority_keyword() {
        let mut config = Config::default();
        config.lexicon.high_priority.push("tornado".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_matches_high_priority_keywords_ignoring_case() {
        let mut config = Config::default();
        config.lexicon.keywords.insert("evacuation".to_string(), 8.0);
        config.lexicon.high_priority = vec!["Evacuation".to_string(), " SHOOTING ".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_keywords_differing_only_by_case() {
        let mut config = Config::default();
        config.lexicon.keywords.insert("Wildfire".to_string(), 2.0);
        config.lexicon.keywords.insert("wildfire ".to_string(), 4.0);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("differ only by case"));
    }

    #[test]
    fn validate_rejects_negative_weight() {
        let mut config = Config::default();
        config.lexicon.keywords.insert("fire".to_string(), -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut config = Config::default();
        config.lexicon.high_priority_patterns.push("(unclosed".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetcher]
            auth = "public"

            [harvest]
            communities = ["AlexandriaVA"]
            hours = 24

            [lexicon]
            keywords = { fire = 5.0, evacuation = 8.0 }
            high_priority = ["evacuation"]
            high_priority_patterns = []
            "#,
        )
        .unwrap();

        assert_eq!(config.fetcher.auth, AuthSetting::Public);
        assert_eq!(config.fetcher.request_delay_ms, 600);
        assert_eq!(config.harvest.hours, 24);
        assert_eq!(config.harvest.max_per_source, 300);
        assert_eq!(config.lexicon.keywords.len(), 2);
        assert_eq!(config.scoring, ScoringPolicy::default());
        assert!(config.validate().is_ok());
    }
}
