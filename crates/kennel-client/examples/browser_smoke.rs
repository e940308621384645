/// Smoke-test for `BrowserFetcher`.
///
/// Renders a page in headless Chromium, scrolling until it stops growing,
/// then prints the cleaned text the scoring pass would see.
///
/// Run with:
///   cargo run -p kennel-client --example browser_smoke --features browser -- <url>
use kennel_client::{BrowserFetcher, HtmdCleaner};
use kennel_core::traits::{Cleaner, Fetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("kennel=debug,info").init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    let fetcher = BrowserFetcher::new().await?;
    let html = fetcher.render(&url).await?;
    anyhow::ensure!(html.len() > 200, "rendered HTML suspiciously short ({} bytes)", html.len());

    let text = HtmdCleaner::new().clean(&html)?;
    println!("{} bytes of HTML, {} chars of text", html.len(), text.chars().count());
    println!("{}", text.chars().take(500).collect::<String>());
    Ok(())
}
