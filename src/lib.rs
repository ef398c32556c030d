// src/lib.rs

//! Community incident harvester library.
//!
//! Fetches recent posts from local-community forums, scores them for
//! emergency relevance and appends them to a deduplicated CSV store.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
