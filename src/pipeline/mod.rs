//! Pipeline entry points for harvester operations.
//!
//! - `CommunityIterator`: Page through each configured community in order
//! - `run_harvest`: Fetch, score and store posts from every community

pub mod communities;
pub mod harvest;

#[cfg(test)]
pub(crate) mod testing;

pub use communities::{CommunityIterator, SourceFailure, SourceReport};
pub use harvest::{HarvestSummary, harvest, run_harvest};
