pub mod cache;
pub mod collect;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod rank;
pub mod retry;
pub mod score;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use cache::{CacheStats, ListingCache};
pub use collect::{CollectionReport, CollectionScheduler, SourceReport};
pub use collector::{CollectContext, Collection, Collector};
pub use config::PipelineConfig;
pub use dedup::{DedupOutcome, deduplicate};
pub use error::AppError;
pub use models::{DescriptionEntry, Listing, NOT_SCORED, ScoreEntry, UNKNOWN_NAME, compute_hash};
pub use pipeline::{Aggregator, RunSummary};
pub use prompt::{PromptTemplate, parse_score};
pub use rank::rank;
pub use retry::{RetryPolicy, retry};
pub use score::{ScoringReport, ScoringScheduler};
pub use traits::{Cleaner, Evaluator, Fetcher};

// Re-exported so collector implementations need no direct dependency.
pub use async_trait::async_trait;
