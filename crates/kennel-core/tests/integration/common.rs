use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kennel_core::{
    AppError, Cleaner, CollectContext, Collection, Collector, Evaluator, Fetcher, Listing,
    async_trait,
};

/// Serves fixed pages by URL; anything else is a 404.
#[derive(Clone, Default)]
pub struct StubFetcher {
    pages: Arc<HashMap<String, String>>,
    pub hits: Arc<AtomicUsize>,
}

impl StubFetcher {
    pub fn with_pages(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: Arc::new(
                pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
            ),
            hits: Arc::default(),
        }
    }
}

impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.pages.get(url).cloned().ok_or_else(|| AppError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    }
}

/// Strips angle-bracket tags.
#[derive(Clone)]
pub struct TagStripper;

impl Cleaner for TagStripper {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        let mut out = String::new();
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                c if !in_tag => out.push(c),
                _ => {}
            }
        }
        Ok(out.trim().to_string())
    }
}

/// Scores by finding a known name in the prompt, ignoring case; anything
/// else gets "50".
#[derive(Clone, Default)]
pub struct TableEvaluator {
    scores: Arc<HashMap<String, String>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl TableEvaluator {
    pub fn new(scores: &[(&str, &str)]) -> Self {
        Self {
            scores: Arc::new(
                scores
                    .iter()
                    .map(|(name, reply)| (name.to_string(), reply.to_string()))
                    .collect(),
            ),
            prompts: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Evaluator for TableEvaluator {
    async fn evaluate(&self, prompt: &str) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let prompt = prompt.to_lowercase();
        let reply = self
            .scores
            .iter()
            .find(|(name, _)| prompt.contains(&name.to_lowercase()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| "50".to_string());
        Ok(reply)
    }
}

/// Returns a fixed list, or fails if built with `failing`.
pub struct ListCollector {
    name: String,
    listings: Vec<Listing>,
    fail: bool,
}

impl ListCollector {
    pub fn new(name: &str, listings: Vec<Listing>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            listings,
            fail: false,
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            listings: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl Collector<StubFetcher> for ListCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _ctx: &CollectContext<StubFetcher>) -> Collection {
        if self.fail {
            Collection::failed(AppError::Generic(format!("{} layout changed", self.name)))
        } else {
            Collection::ok(self.listings.clone())
        }
    }
}
