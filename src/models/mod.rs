// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
pub mod listing;
mod post;

// Re-export all public types
pub use config::{
    AuthSetting, Config, FetcherConfig, HarvestConfig, LexiconConfig, OutputConfig,
    ScoringPolicy,
};
pub use post::{FetchWindow, Page, RawPost, ScoredPost};
