use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use kennel_core::error::AppError;
use kennel_core::traits::Fetcher;

const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";
const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Headless Chromium renderer for listing pages built client-side.
///
/// One browser process is shared by every clone; each call opens a tab,
/// scrolls until the page stops growing (infinite-scroll galleries load
/// more cards on the way down), grabs the DOM and closes the tab.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
    max_scrolls: u32,
    settle: Duration,
}

impl BrowserFetcher {
    /// 30 s per page, up to 5 scrolls, 1.5 s settle between scrolls.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::RenderError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to launch browser: {e}")))?;

        // The CDP connection only makes progress while its handler is polled.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler stopped");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
            max_scrolls: 5,
            settle: Duration::from_millis(1500),
        })
    }

    pub fn with_scrolling(mut self, max_scrolls: u32, settle: Duration) -> Self {
        self.max_scrolls = max_scrolls;
        self.settle = settle;
        self
    }

    async fn load(&self, url: &str) -> Result<String, AppError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to navigate to {url}: {e}")))?;

        let result = self.read_page(&page, url).await;
        if let Err(e) = page.close().await {
            tracing::debug!(%url, error = %e, "Failed to close tab");
        }
        result
    }

    async fn read_page(&self, page: &Page, url: &str) -> Result<String, AppError> {
        page.find_element("body")
            .await
            .map_err(|e| AppError::RenderError(format!("{url} did not render a body: {e}")))?;

        let mut last_height = scroll_height(page).await;
        for scroll in 0..self.max_scrolls {
            if let Err(e) = page.evaluate(SCROLL_TO_BOTTOM_JS).await {
                tracing::debug!(%url, error = %e, "Scroll failed");
                break;
            }
            tokio::time::sleep(self.settle).await;
            let height = scroll_height(page).await;
            if height == last_height {
                tracing::debug!(%url, scrolls = scroll + 1, "Page stopped growing");
                break;
            }
            last_height = height;
        }

        page.content()
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to read content of {url}: {e}")))
    }
}

async fn scroll_height(page: &Page) -> Option<f64> {
    page.evaluate(SCROLL_HEIGHT_JS)
        .await
        .ok()
        .and_then(|result| result.into_value::<f64>().ok())
}

/// `CHROME_BIN` first, then the usual install locations. The snap wrapper
/// at `/snap/bin/chromium` drops headless flags, so the real binary inside
/// the snap is preferred.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        match tokio::time::timeout(self.timeout, self.load(url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        self.fetch(url).await
    }
}
