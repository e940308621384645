use std::path::PathBuf;
use std::time::Duration;

use crate::collect::DEFAULT_COLLECT_CONCURRENCY;
use crate::error::AppError;
use crate::retry::RetryPolicy;
use crate::score::DEFAULT_SCORE_CONCURRENCY;

pub const DEFAULT_CACHE_PATH: &str = "kennel_cache.json";
pub const DEFAULT_PROMPT_PATH: &str = "prompt.txt";
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Runtime settings for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cache_path: PathBuf,
    pub prompt_path: PathBuf,
    pub collect_concurrency: usize,
    pub score_concurrency: usize,
    pub fetch_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
            collect_concurrency: DEFAULT_COLLECT_CONCURRENCY,
            score_concurrency: DEFAULT_SCORE_CONCURRENCY,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from environment variables.
    ///
    /// - `KENNEL_CACHE_PATH` (defaults to `kennel_cache.json`)
    /// - `KENNEL_PROMPT_PATH` (defaults to `prompt.txt`)
    /// - `KENNEL_COLLECT_CONCURRENCY` (defaults to 10)
    /// - `KENNEL_SCORE_CONCURRENCY` (defaults to 10)
    /// - `KENNEL_FETCH_ATTEMPTS` (defaults to 3)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        Ok(Self {
            cache_path: path("KENNEL_CACHE_PATH", defaults.cache_path),
            prompt_path: path("KENNEL_PROMPT_PATH", defaults.prompt_path),
            collect_concurrency: positive(
                "KENNEL_COLLECT_CONCURRENCY",
                lookup("KENNEL_COLLECT_CONCURRENCY"),
                defaults.collect_concurrency,
            )?,
            score_concurrency: positive(
                "KENNEL_SCORE_CONCURRENCY",
                lookup("KENNEL_SCORE_CONCURRENCY"),
                defaults.score_concurrency,
            )?,
            fetch_attempts: positive(
                "KENNEL_FETCH_ATTEMPTS",
                lookup("KENNEL_FETCH_ATTEMPTS"),
                defaults.fetch_attempts,
            )?,
        })
    }

    /// Retry policy for page fetches: `fetch_attempts` tries, 1 s doubling.
    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_attempts, Duration::from_secs(1))
    }
}

fn positive<T>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let parsed: T = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == T::default() {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(parsed)
}
