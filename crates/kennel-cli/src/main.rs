use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "browser")]
use kennel_client::BrowserFetcher;
use kennel_client::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use kennel_client::{
    HtmdCleaner, OpenAiEvaluator, PageFetcher, ReqwestFetcher, SelectorCollector, SelectorSource,
    load_sources,
};
use kennel_core::{Aggregator, Collector, ListingCache, PipelineConfig, PromptTemplate};

#[derive(Parser)]
#[command(name = "kennel", version, about = "Aggregate and rank adoptable-dog listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every source, score each unique dog, print the ranked list
    Run {
        /// JSON file listing the sources to collect
        #[arg(short, long, env = "KENNEL_SOURCES", default_value = "sources.json")]
        sources: PathBuf,

        /// Only print the best N listings
        #[arg(short, long)]
        top: Option<usize>,

        /// Print the full run summary instead of just the listings
        #[arg(long, default_value_t = false)]
        summary: bool,

        /// Evaluator model
        #[arg(short, long, env = "KENNEL_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// OpenAI-compatible API base URL
        #[arg(short, long, env = "KENNEL_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Evaluator API key; without one, listings are collected but not scored
        #[arg(short, long, env = "KENNEL_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Validate a sources file without fetching anything
    CheckSources {
        #[arg(short, long, env = "KENNEL_SOURCES", default_value = "sources.json")]
        sources: PathBuf,
    },

    /// Show what the cache file holds
    CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kennel=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            sources,
            top,
            summary,
            model,
            base_url,
            api_key,
        } => {
            cmd_run(
                &config,
                &sources,
                top,
                summary,
                &model,
                &base_url,
                api_key.as_deref(),
            )
            .await?;
        }
        Commands::CheckSources { sources } => cmd_check_sources(&sources)?,
        Commands::CacheStats => cmd_cache_stats(&config),
    }

    Ok(())
}

fn build_collectors(
    sources: Vec<SelectorSource>,
) -> Result<Vec<Arc<dyn Collector<PageFetcher>>>> {
    sources
        .into_iter()
        .map(|source| {
            let collector = SelectorCollector::new(source)?;
            Ok(Arc::new(collector) as Arc<dyn Collector<PageFetcher>>)
        })
        .collect::<Result<_, kennel_core::AppError>>()
        .map_err(anyhow::Error::from)
}

async fn build_fetcher(config: &PipelineConfig, sources: &[SelectorSource]) -> Result<PageFetcher> {
    let http = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    // The only retry layer for page fetches.
    let fetcher = PageFetcher::new(http).with_retry(config.fetch_retry());

    let wants_render = sources.iter().any(|s| s.render);

    #[cfg(feature = "browser")]
    let fetcher = if wants_render {
        let browser = BrowserFetcher::new()
            .await
            .context("Failed to launch headless browser")?;
        fetcher.with_browser(browser)
    } else {
        fetcher
    };

    if wants_render && !fetcher.has_renderer() {
        tracing::warn!("Some sources need rendering; built without the `browser` feature, using plain HTTP");
    }
    Ok(fetcher)
}

async fn cmd_run(
    config: &PipelineConfig,
    sources_path: &Path,
    top: Option<usize>,
    summary: bool,
    model: &str,
    base_url: &str,
    api_key: Option<&str>,
) -> Result<()> {
    let sources = load_sources(sources_path)
        .with_context(|| format!("Failed to load sources from {}", sources_path.display()))?;
    tracing::info!(sources = sources.len(), "Loaded sources");

    let fetcher = build_fetcher(config, &sources).await?;
    let collectors = build_collectors(sources)?;

    let evaluator = match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Some(
            OpenAiEvaluator::with_base_url(key, model, base_url)
                .context("Failed to create evaluator client")?,
        ),
        None => {
            tracing::warn!("KENNEL_API_KEY not set; listings will not be scored");
            None
        }
    };

    let cache = Arc::new(ListingCache::open(&config.cache_path));
    let template = PromptTemplate::load(&config.prompt_path);

    let aggregator =
        Aggregator::new(fetcher, HtmdCleaner::new(), evaluator, Arc::clone(&cache), template)
            .with_config(config);
    let mut result = aggregator.run(&collectors).await;
    if let Err(e) = cache.flush().await {
        tracing::warn!(path = %config.cache_path.display(), error = %e, "Failed to flush cache");
    }

    for source in result.failed_sources() {
        tracing::warn!(source = %source.source, error = source.error.as_deref().unwrap_or_default(), "Source failed");
    }
    tracing::info!(cache = %result.cache, "Cache usage");

    if let Some(n) = top {
        result.listings.truncate(n);
    }

    let output = if summary {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string_pretty(&result.listings)?
    };
    println!("{output}");

    Ok(())
}

fn cmd_check_sources(path: &Path) -> Result<()> {
    let sources = load_sources(path)
        .with_context(|| format!("Failed to load sources from {}", path.display()))?;

    let mut invalid = 0;
    for source in sources {
        let name = source.name.clone();
        match SelectorCollector::new(source) {
            Ok(_) => println!("  ok       {name}"),
            Err(e) => {
                invalid += 1;
                println!("  invalid  {name}: {e}");
            }
        }
    }

    anyhow::ensure!(invalid == 0, "{invalid} invalid source(s)");
    Ok(())
}

fn cmd_cache_stats(config: &PipelineConfig) {
    let cache = ListingCache::open(&config.cache_path);
    let stats = cache.stats();
    println!("Cache file: {}", config.cache_path.display());
    println!("  descriptions: {}", stats.description_entries);
    println!("  scores:       {}", stats.score_entries);
}
