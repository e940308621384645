use std::future::Future;

use crate::error::AppError;

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone + 'static {
    /// Plain HTTP GET.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Fetch with JavaScript rendering, for sites that build their listing
    /// pages client-side. Fetchers without a renderer fall back to `fetch`.
    fn render(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send {
        self.fetch(url)
    }
}

/// Converts raw HTML into plain description text.
pub trait Cleaner: Send + Sync + Clone + 'static {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Scores a listing by sending a rendered prompt to a remote model.
pub trait Evaluator: Send + Sync + Clone + 'static {
    /// Returns the raw response text; the caller extracts the score.
    fn evaluate(&self, prompt: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}
