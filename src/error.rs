/// Core error type for the watcher.
///
/// Adapters map their transport-specific failures into this type so the
/// scheduler and backfill engine can handle them consistently (skip-and-retry
/// vs. surface-to-caller).
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source quota exceeded: {0}")]
    SourceQuotaExceeded(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backfill already in progress for {0}")]
    BackfillInProgress(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
