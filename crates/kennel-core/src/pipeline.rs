use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheStats, ListingCache};
use crate::collect::{CollectionScheduler, DEFAULT_COLLECT_CONCURRENCY, SourceReport};
use crate::collector::{CollectContext, Collector};
use crate::config::PipelineConfig;
use crate::dedup::deduplicate;
use crate::models::Listing;
use crate::prompt::PromptTemplate;
use crate::rank::rank;
use crate::retry::RetryPolicy;
use crate::score::{DEFAULT_SCORE_CONCURRENCY, ScoringReport, ScoringScheduler};
use crate::traits::{Cleaner, Evaluator, Fetcher};

/// Everything one run produced.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Ranked, highest score first.
    pub listings: Vec<Listing>,
    pub sources: Vec<SourceReport>,
    /// Listings reported by collectors before deduplication.
    pub collected: usize,
    pub duplicates: usize,
    pub scoring: ScoringReport,
    pub cache: CacheStats,
}

impl RunSummary {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}

/// Collection, deduplication, scoring and ranking wired together.
pub struct Aggregator<F, C, E> {
    fetcher: F,
    cleaner: C,
    evaluator: Option<E>,
    cache: Arc<ListingCache>,
    template: Arc<PromptTemplate>,
    collect_concurrency: usize,
    score_concurrency: usize,
    evaluator_retry: RetryPolicy,
}

impl<F, C, E> Aggregator<F, C, E>
where
    F: Fetcher,
    C: Cleaner,
    E: Evaluator,
{
    /// `evaluator` is `None` when no API key is configured.
    pub fn new(
        fetcher: F,
        cleaner: C,
        evaluator: Option<E>,
        cache: Arc<ListingCache>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            fetcher,
            cleaner,
            evaluator,
            cache,
            template: Arc::new(template),
            collect_concurrency: DEFAULT_COLLECT_CONCURRENCY,
            score_concurrency: DEFAULT_SCORE_CONCURRENCY,
            evaluator_retry: RetryPolicy::default(),
        }
    }

    /// Concurrency limits. Page-fetch retries belong to the fetcher, see
    /// [`PipelineConfig::fetch_retry`].
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.collect_concurrency = config.collect_concurrency;
        self.score_concurrency = config.score_concurrency;
        self
    }

    pub fn with_evaluator_retry(mut self, policy: RetryPolicy) -> Self {
        self.evaluator_retry = policy;
        self
    }

    /// Collect, deduplicate, score and rank. Never fails: collector and
    /// evaluator errors are absorbed into the per-listing results.
    pub async fn aggregate_and_rank(&self, collectors: &[Arc<dyn Collector<F>>]) -> Vec<Listing> {
        self.run(collectors).await.listings
    }

    pub async fn run(&self, collectors: &[Arc<dyn Collector<F>>]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, collectors).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, collectors: &[Arc<dyn Collector<F>>]) -> RunSummary {
        tracing::info!(collectors = collectors.len(), "Starting aggregation run");

        let ctx = CollectContext::new(self.fetcher.clone(), Arc::clone(&self.cache));
        let collection = CollectionScheduler::new(self.collect_concurrency)
            .run(collectors, &ctx)
            .await;
        let collected = collection.listings.len();
        for source in collection.empty_sources() {
            tracing::warn!(
                source = %source.source,
                error = source.error.as_deref().unwrap_or_default(),
                "Source produced no listings"
            );
        }

        let unique = deduplicate(collection.listings);
        tracing::info!(
            collected,
            unique = unique.listings.len(),
            duplicates = unique.duplicates,
            "Deduplicated listings"
        );

        let scheduler = ScoringScheduler::new(
            self.fetcher.clone(),
            self.cleaner.clone(),
            self.evaluator.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.template),
        )
        .with_max_concurrency(self.score_concurrency)
        .with_evaluator_retry(self.evaluator_retry.clone());
        let (scored, scoring) = scheduler.score_all(unique.listings).await;

        let listings = rank(scored);
        let cache = self.cache.stats();
        tracing::info!(listings = listings.len(), %cache, "Aggregation run finished");

        RunSummary {
            run_id,
            listings,
            sources: collection.sources,
            collected,
            duplicates: unique.duplicates,
            scoring,
            cache,
        }
    }
}
