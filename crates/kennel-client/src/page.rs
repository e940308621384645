use kennel_core::error::AppError;
use kennel_core::retry::{RetryPolicy, retry};
use kennel_core::traits::Fetcher;

#[cfg(feature = "browser")]
use crate::browser_fetcher::BrowserFetcher;
use crate::fetcher::ReqwestFetcher;

/// The fetcher handed to collectors and the scoring pass.
///
/// `fetch` is plain HTTP; `render` goes through the headless browser when
/// one was attached and degrades to HTTP otherwise. Both retry transient
/// failures per the configured policy.
#[derive(Clone)]
pub struct PageFetcher {
    http: ReqwestFetcher,
    #[cfg(feature = "browser")]
    browser: Option<BrowserFetcher>,
    retry: RetryPolicy,
}

impl PageFetcher {
    pub fn new(http: ReqwestFetcher) -> Self {
        Self {
            http,
            #[cfg(feature = "browser")]
            browser: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[cfg(feature = "browser")]
    pub fn with_browser(mut self, browser: BrowserFetcher) -> Self {
        self.browser = Some(browser);
        self
    }

    #[cfg(feature = "browser")]
    pub fn has_renderer(&self) -> bool {
        self.browser.is_some()
    }

    #[cfg(not(feature = "browser"))]
    pub fn has_renderer(&self) -> bool {
        false
    }
}

impl Fetcher for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        retry(&self.retry, url, AppError::is_retryable, || self.http.fetch(url)).await
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        #[cfg(feature = "browser")]
        let rendered = match &self.browser {
            Some(browser) => {
                Some(retry(&self.retry, url, AppError::is_retryable, || browser.render(url)).await)
            }
            None => None,
        };
        #[cfg(not(feature = "browser"))]
        let rendered: Option<Result<String, AppError>> = None;

        if let Some(result) = rendered {
            return result;
        }

        tracing::debug!(%url, "No renderer attached, fetching over HTTP");
        self.fetch(url).await
    }
}
