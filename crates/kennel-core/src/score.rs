//! Concurrent scoring pass.
//!
//! Each unique listing moves through:
//!
//! ```text
//! NeedsDescription --(no text recoverable)--> Unscorable
//!        |
//!        v
//!   CacheLookup --(hit)--> Scored (cached, no remote call)
//!        |
//!        v
//!    Evaluate --(no evaluator)--> Unscorable
//!        |   \--(error)--> Error
//!        v
//!     Scored (written back to the cache)
//! ```
//!
//! Failed listings get `score = -1` and a one-line reason in `score_details`.
//! Without an evaluator no detail page is fetched: NeedsDescription only
//! consults the Fetch Cache and falls through to CacheLookup either way.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::ListingCache;
use crate::collect::panic_message;
use crate::error::AppError;
use crate::models::{Listing, NOT_SCORED};
use crate::prompt::{PromptTemplate, parse_score};
use crate::retry::{RetryPolicy, retry};
use crate::traits::{Cleaner, Evaluator, Fetcher};

/// Default ceiling on listings evaluated at once.
pub const DEFAULT_SCORE_CONCURRENCY: usize = 10;

pub const MISSING_DESCRIPTION: &str = "Missing description";
pub const MISSING_API_KEY: &str = "Missing API key";
pub const SCORING_ERROR: &str = "Error scoring";

/// Terminal state of one listing's scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreStatus {
    /// Fresh evaluator result.
    Evaluated,
    /// Served from the Scoring Cache.
    Cached,
    /// No description, or no evaluator configured.
    Unscorable,
    /// Evaluator call failed.
    Error,
}

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub status: ScoreStatus,
    pub score: i64,
    pub details: Vec<String>,
    /// Description recovered during NeedsDescription, if any.
    pub description: Option<String>,
}

impl ScoreOutcome {
    fn failed(status: ScoreStatus, reason: &str) -> Self {
        Self {
            status,
            score: NOT_SCORED,
            details: vec![reason.to_string()],
            description: None,
        }
    }

    fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// Counts per terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringReport {
    pub evaluated: usize,
    pub cached: usize,
    pub unscorable: usize,
    pub failed: usize,
}

impl ScoringReport {
    fn record(&mut self, status: ScoreStatus) {
        match status {
            ScoreStatus::Evaluated => self.evaluated += 1,
            ScoreStatus::Cached => self.cached += 1,
            ScoreStatus::Unscorable => self.unscorable += 1,
            ScoreStatus::Error => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.evaluated + self.cached + self.unscorable + self.failed
    }
}

/// Everything one scoring task needs; cloned into each task.
struct Worker<F, C, E> {
    fetcher: F,
    cleaner: C,
    evaluator: Option<E>,
    cache: Arc<ListingCache>,
    template: Arc<PromptTemplate>,
    evaluator_retry: RetryPolicy,
}

impl<F: Clone, C: Clone, E: Clone> Clone for Worker<F, C, E> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            cleaner: self.cleaner.clone(),
            evaluator: self.evaluator.clone(),
            cache: Arc::clone(&self.cache),
            template: Arc::clone(&self.template),
            evaluator_retry: self.evaluator_retry.clone(),
        }
    }
}

impl<F, C, E> Worker<F, C, E>
where
    F: Fetcher,
    C: Cleaner,
    E: Evaluator,
{
    async fn score_one(&self, listing: &Listing) -> ScoreOutcome {
        // NeedsDescription
        let recovered = if listing.description.trim().is_empty() {
            let text = self.recover_description(listing).await;
            if text.is_none() && self.evaluator.is_some() {
                tracing::warn!(name = %listing.name, url = %listing.detail_url, "No description to score");
                return ScoreOutcome::failed(ScoreStatus::Unscorable, MISSING_DESCRIPTION);
            }
            text
        } else {
            None
        };

        // CacheLookup
        let key = listing.cache_key();
        let fingerprint = self.template.fingerprint();
        if let Some(entry) = self.cache.get_score(&key, fingerprint) {
            tracing::debug!(name = %listing.name, score = entry.score, "Score cache hit");
            return ScoreOutcome {
                status: ScoreStatus::Cached,
                score: entry.score,
                details: entry.score_details,
                description: recovered,
            };
        }

        // Evaluate
        let Some(evaluator) = &self.evaluator else {
            return ScoreOutcome::failed(ScoreStatus::Unscorable, MISSING_API_KEY)
                .with_description(recovered);
        };

        let prompt = match &recovered {
            Some(text) => {
                let mut filled = listing.clone();
                filled.description = text.clone();
                self.template.render(&filled)
            }
            None => self.template.render(listing),
        };

        let response = retry(
            &self.evaluator_retry,
            &listing.name,
            AppError::is_retryable,
            || evaluator.evaluate(&prompt),
        )
        .await;

        match response {
            Ok(text) => {
                let score = parse_score(&text).unwrap_or_else(|| {
                    tracing::warn!(name = %listing.name, response = %text.trim(), "Could not parse score from evaluator response");
                    0
                });
                let details = vec![format!("Evaluator score: {score}/100")];
                if let Err(e) = self.cache.set_score(&key, fingerprint, score, &details).await {
                    tracing::warn!(name = %listing.name, error = %e, "Failed to persist score");
                }
                tracing::info!(name = %listing.name, source = %listing.source, score, "Scored listing");
                ScoreOutcome {
                    status: ScoreStatus::Evaluated,
                    score,
                    details,
                    description: recovered,
                }
            }
            Err(e) => {
                tracing::error!(name = %listing.name, error = %e, "Error scoring listing");
                ScoreOutcome::failed(ScoreStatus::Error, SCORING_ERROR).with_description(recovered)
            }
        }
    }

    /// Fetch Cache first, then the detail page. The fetcher owns retries.
    async fn recover_description(&self, listing: &Listing) -> Option<String> {
        let key = listing.cache_key();
        if let Some(entry) = self.cache.get_description(&key) {
            tracing::debug!(name = %listing.name, "Description cache hit");
            return Some(entry.text);
        }
        // Without an evaluator the fetched text could never be scored.
        if listing.detail_url.is_empty() || self.evaluator.is_none() {
            return None;
        }

        let url = listing.detail_url.as_str();
        let page = if listing.needs_render {
            self.fetcher.render(url).await
        } else {
            self.fetcher.fetch(url).await
        };
        let html = match page {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Failed to fetch detail page");
                return None;
            }
        };

        let text = match self.cleaner.clean(&html) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(%url, error = %e, "Failed to clean detail page");
                return None;
            }
        };
        if text.is_empty() {
            return None;
        }

        if let Err(e) = self
            .cache
            .set_description(&key, &text, Some(&listing.name))
            .await
        {
            tracing::warn!(%url, error = %e, "Failed to persist description");
        }
        Some(text)
    }
}

/// Scores every unique listing with bounded parallelism.
///
/// An evaluator of `None` models a missing API key: every listing that is
/// not already cached ends up as "Missing API key" and the run completes
/// without touching the network.
pub struct ScoringScheduler<F, C, E> {
    worker: Worker<F, C, E>,
    max_concurrency: usize,
}

impl<F, C, E> ScoringScheduler<F, C, E>
where
    F: Fetcher,
    C: Cleaner,
    E: Evaluator,
{
    pub fn new(
        fetcher: F,
        cleaner: C,
        evaluator: Option<E>,
        cache: Arc<ListingCache>,
        template: Arc<PromptTemplate>,
    ) -> Self {
        Self {
            worker: Worker {
                fetcher,
                cleaner,
                evaluator,
                cache,
                template,
                evaluator_retry: RetryPolicy::default(),
            },
            max_concurrency: DEFAULT_SCORE_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_evaluator_retry(mut self, policy: RetryPolicy) -> Self {
        self.worker.evaluator_retry = policy;
        self
    }

    /// Score `listings` and return them in their input order.
    ///
    /// Callers must pass each listing once; workers are partitioned by
    /// listing, not by cache key.
    pub async fn score_all(&self, mut listings: Vec<Listing>) -> (Vec<Listing>, ScoringReport) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, listing) in listings.iter().enumerate() {
            let worker = self.worker.clone();
            let listing = listing.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = AssertUnwindSafe(worker.score_one(&listing))
                    .catch_unwind()
                    .await;
                (index, outcome)
            });
        }

        let mut report = ScoringReport::default();
        let mut resolved = vec![false; listings.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok((index, Ok(outcome))) => (index, outcome),
                Ok((index, Err(panic))) => {
                    tracing::error!(
                        name = %listings[index].name,
                        panic = %panic_message(panic.as_ref()),
                        "Scoring task panicked"
                    );
                    (index, ScoreOutcome::failed(ScoreStatus::Error, SCORING_ERROR))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scoring task aborted");
                    continue;
                }
            };

            report.record(outcome.status);
            resolved[index] = true;
            let listing = &mut listings[index];
            listing.score = outcome.score;
            listing.score_details = outcome.details;
            if let Some(description) = outcome.description {
                listing.description = description;
            }
        }

        for (listing, _) in listings
            .iter_mut()
            .zip(resolved)
            .filter(|(_, resolved)| !resolved)
        {
            report.record(ScoreStatus::Error);
            listing.score = NOT_SCORED;
            listing.score_details = vec![SCORING_ERROR.to_string()];
        }

        tracing::info!(
            evaluated = report.evaluated,
            cached = report.cached,
            unscorable = report.unscorable,
            failed = report.failed,
            "Scoring finished"
        );
        (listings, report)
    }
}
