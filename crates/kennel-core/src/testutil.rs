//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collector::{Collection, CollectContext, Collector};
use crate::error::AppError;
use crate::models::Listing;
use crate::traits::{Cleaner, Evaluator, Fetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL responses and a default for everything else.
#[derive(Clone)]
pub struct MockFetcher {
    default: Arc<Mutex<Option<String>>>,
    by_url: Arc<Mutex<HashMap<String, Vec<Result<String, AppError>>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    /// URLs requested through `render`; they also land in `calls`.
    pub renders: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Every URL returns `html`.
    pub fn new(html: &str) -> Self {
        Self {
            default: Arc::new(Mutex::new(Some(html.to_string()))),
            by_url: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            renders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every URL not explicitly registered fails with HTTP 404.
    pub fn unreachable() -> Self {
        Self {
            default: Arc::new(Mutex::new(None)),
            by_url: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            renders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue responses for one URL. Each call pops the first element;
    /// once drained, the default applies.
    pub fn with_responses(self, url: &str, responses: Vec<Result<String, AppError>>) -> Self {
        self.by_url
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(queue) = self.by_url.lock().unwrap().get_mut(url)
            && !queue.is_empty()
        {
            return queue.remove(0);
        }
        match self.default.lock().unwrap().clone() {
            Some(html) => Ok(html),
            None => Err(AppError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        self.renders.lock().unwrap().push(url.to_string());
        self.fetch(url).await
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns the input unchanged, or a configured error.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// MockEvaluator
// ---------------------------------------------------------------------------

/// Mock evaluator that records prompts and replays queued responses.
#[derive(Clone)]
pub struct MockEvaluator {
    default: Arc<Mutex<String>>,
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    /// Prompts containing this marker fail with a non-retryable error.
    fail_marker: Arc<Mutex<Option<String>>>,
    /// When set, each call is tracked and takes a few milliseconds.
    tracker: Option<ConcurrencyTracker>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockEvaluator {
    /// Always answers `text`.
    pub fn new(text: &str) -> Self {
        Self {
            default: Arc::new(Mutex::new(text.to_string())),
            responses: Arc::new(Mutex::new(Vec::new())),
            fail_marker: Arc::new(Mutex::new(None)),
            tracker: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tracked(mut self, tracker: ConcurrencyTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_responses(self, responses: Vec<Result<String, AppError>>) -> Self {
        *self.responses.lock().unwrap() = responses;
        self
    }

    pub fn failing_on(self, marker: &str) -> Self {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Evaluator for MockEvaluator {
    async fn evaluate(&self, prompt: &str) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(tracker) = &self.tracker {
            tracker.enter();
            tokio::time::sleep(Duration::from_millis(20)).await;
            tracker.exit();
        }
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref()
            && prompt.contains(marker)
        {
            return Err(AppError::EvaluatorError {
                message: "model refused".into(),
                status_code: 400,
                retryable: false,
            });
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default.lock().unwrap().clone())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// Collector returning a fixed set of listings, optionally with an error.
pub struct StaticCollector {
    name: String,
    listings: Vec<Listing>,
    error: Mutex<Option<AppError>>,
}

impl StaticCollector {
    pub fn new(name: impl Into<String>, listings: Vec<Listing>) -> Self {
        Self {
            name: name.into(),
            listings,
            error: Mutex::new(None),
        }
    }

    pub fn with_error(self, error: AppError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }
}

#[async_trait]
impl<F: Fetcher> Collector<F> for StaticCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _ctx: &CollectContext<F>) -> Collection {
        let listings = self.listings.clone();
        match self.error.lock().unwrap().take() {
            Some(e) => Collection::partial(listings, e),
            None => Collection::ok(listings),
        }
    }
}

/// Collector that always fails without listings.
pub struct FailingCollector {
    name: String,
    error: Mutex<Option<AppError>>,
}

impl FailingCollector {
    pub fn new(name: impl Into<String>, error: AppError) -> Self {
        Self {
            name: name.into(),
            error: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Collector<F> for FailingCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _ctx: &CollectContext<F>) -> Collection {
        let error = self
            .error
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| AppError::Generic("already failed".into()));
        Collection::failed(error)
    }
}

/// Collector that breaks its contract and panics.
pub struct PanickingCollector {
    name: String,
}

impl PanickingCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<F: Fetcher> Collector<F> for PanickingCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _ctx: &CollectContext<F>) -> Collection {
        panic!("selector returned nothing for {}", self.name);
    }
}

/// Records how many tracked operations overlap.
#[derive(Clone, Default)]
pub struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyTracker {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Collector that sleeps briefly while tracked, to observe parallelism.
pub struct SlowCollector {
    name: String,
    tracker: ConcurrencyTracker,
}

impl SlowCollector {
    pub fn new(name: impl Into<String>, tracker: ConcurrencyTracker) -> Self {
        Self {
            name: name.into(),
            tracker,
        }
    }
}

#[async_trait]
impl<F: Fetcher> Collector<F> for SlowCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _ctx: &CollectContext<F>) -> Collection {
        self.tracker.enter();
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.tracker.exit();
        Collection::ok(vec![Listing::new(&self.name, "Rex", format!("/{}", self.name))])
    }
}
