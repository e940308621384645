use thiserror::Error;

/// Application-wide error types for Kennel.
#[derive(Error, Debug)]
pub enum AppError {
    /// Server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// DNS failure or connection refused. Not worth retrying.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection reset, truncated body and other mid-flight failures.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Evaluator (LLM) call failed.
    #[error("Evaluator error (HTTP {status_code}): {message}")]
    EvaluatorError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Headless browser could not render the page.
    #[error("Render error: {0}")]
    RenderError(String),

    /// HTML-to-text conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// Cache file could not be written.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// 5xx, 429, timeouts and resets are transient. 4xx, DNS failures and
    /// refused connections are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::EvaluatorError { retryable, .. } => *retryable,
            AppError::RenderError(msg) => msg.contains("timeout") || msg.contains("reset"),
            _ => false,
        }
    }
}
