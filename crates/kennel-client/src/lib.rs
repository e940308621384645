#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod cleaner;
pub mod fetcher;
pub mod llm;
pub mod page;
pub mod selector;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use cleaner::HtmdCleaner;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiEvaluator;
pub use page::PageFetcher;
pub use selector::{SelectorCollector, SelectorSource, load_sources};
