use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::ListingCache;
use crate::error::AppError;
use crate::models::{DescriptionEntry, Listing};
use crate::traits::Fetcher;

/// What a collector hands back: whatever it managed to gather, plus the
/// error that cut it short, if any.
#[derive(Debug, Default)]
pub struct Collection {
    pub listings: Vec<Listing>,
    pub error: Option<AppError>,
}

impl Collection {
    pub fn ok(listings: Vec<Listing>) -> Self {
        Self {
            listings,
            error: None,
        }
    }

    pub fn partial(listings: Vec<Listing>, error: AppError) -> Self {
        Self {
            listings,
            error: Some(error),
        }
    }

    pub fn failed(error: AppError) -> Self {
        Self::partial(Vec::new(), error)
    }
}

/// Dependencies handed to every collector.
pub struct CollectContext<F: Fetcher> {
    pub fetcher: F,
    pub cache: Arc<ListingCache>,
}

impl<F: Fetcher> Clone for CollectContext<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<F: Fetcher> CollectContext<F> {
    pub fn new(fetcher: F, cache: Arc<ListingCache>) -> Self {
        Self { fetcher, cache }
    }

    /// Previously extracted description for a detail URL.
    pub fn cached(&self, url: &str) -> Option<DescriptionEntry> {
        if url.is_empty() {
            return None;
        }
        self.cache.get_description(url)
    }

    /// Record a freshly extracted description. Persist failures are logged,
    /// never returned: losing a cache write only costs a refetch next run.
    pub async fn remember(&self, url: &str, text: &str, name: Option<&str>) {
        if url.is_empty() {
            return;
        }
        if let Err(e) = self.cache.set_description(url, text, name).await {
            tracing::warn!(%url, error = %e, "Failed to persist description");
        }
    }
}

/// One website's listing collector.
///
/// Implementations never panic on bad markup or failed requests: they
/// return what they have through [`Collection::partial`]. Whether the Fetch
/// Cache is consulted before fetching a detail page is up to each collector.
#[async_trait]
pub trait Collector<F: Fetcher>: Send + Sync {
    /// Source identifier, used in logs and on every listing it produces.
    fn name(&self) -> &str;

    async fn collect(&self, ctx: &CollectContext<F>) -> Collection;
}
