use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::collector::{Collection, CollectContext, Collector};
use crate::models::Listing;
use crate::traits::Fetcher;

/// Default ceiling on collectors running at once.
pub const DEFAULT_COLLECT_CONCURRENCY: usize = 10;

/// Per-source outcome of a collection pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub count: usize,
    pub error: Option<String>,
}

/// Raw merged listings plus what each source did.
#[derive(Debug, Default)]
pub struct CollectionReport {
    /// Completion order: first finished, first appended.
    pub listings: Vec<Listing>,
    pub sources: Vec<SourceReport>,
}

impl CollectionReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }

    /// Sources that reported zero listings, failed or not.
    pub fn empty_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.count == 0)
    }
}

/// Runs every registered collector with bounded parallelism and merges
/// their output. A failing or panicking collector costs only its own
/// listings.
pub struct CollectionScheduler {
    max_concurrency: usize,
}

impl Default for CollectionScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECT_CONCURRENCY)
    }
}

impl CollectionScheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn run<F: Fetcher>(
        &self,
        collectors: &[Arc<dyn Collector<F>>],
        ctx: &CollectContext<F>,
    ) -> CollectionReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for collector in collectors {
            let collector = Arc::clone(collector);
            let ctx = ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let name = collector.name().to_string();
                let _permit = semaphore.acquire_owned().await;
                tracing::info!(source = %name, "Collecting");
                let outcome = AssertUnwindSafe(collector.collect(&ctx))
                    .catch_unwind()
                    .await;
                (name, outcome)
            });
        }

        let mut report = CollectionReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (source, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // Panics are caught inside the task; this is cancellation.
                    tracing::error!(error = %e, "Collector task aborted");
                    continue;
                }
            };

            match outcome {
                Ok(Collection { listings, error }) => {
                    let count = listings.len();
                    let error = error.map(|e| {
                        tracing::error!(source = %source, count, error = %e, "Collector failed");
                        e.to_string()
                    });
                    if error.is_none() {
                        if count == 0 {
                            tracing::warn!(source = %source, "Collector returned no listings");
                        } else {
                            tracing::info!(source = %source, count, "Collected listings");
                        }
                    }
                    report.listings.extend(listings);
                    report.sources.push(SourceReport {
                        source,
                        count,
                        error,
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(source = %source, panic = %message, "Collector panicked");
                    report.sources.push(SourceReport {
                        source,
                        count: 0,
                        error: Some(format!("panicked: {message}")),
                    });
                }
            }
        }

        tracing::info!(
            sources = report.sources.len(),
            failed = report.failed_sources().count(),
            listings = report.listings.len(),
            "Collection finished"
        );
        report
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
