use crate::store::StoreError;
use crate::transport::Transport;
use serde::Serialize;

/// Failure classes of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Timeouts and dropped connections, retried before escalation.
    TransientNetwork,
    /// Challenge interstitial that survived escalation.
    Blocked,
    /// The adapter found nothing to extract.
    ExtractionEmpty,
    /// The document store rejected a read or write.
    Persistence,
    /// The rendering engine could not be launched. Fatal to the run.
    EngineUnavailable,
    /// The run could not be assembled from its configuration.
    Configuration,
}

/// Error contract shared by every pipeline component.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Fetch failed for {url} via {transport}: {reason}")]
    FetchFailed {
        url: String,
        transport: Transport,
        /// Blocked or TransientNetwork, decided where the failure was seen.
        cause: ErrorKind,
        reason: String,
    },

    #[error("Nothing extracted: {0}")]
    ExtractionEmpty(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            CrawlError::FetchFailed { cause, .. } => *cause,
            CrawlError::ExtractionEmpty(_) => ErrorKind::ExtractionEmpty,
            CrawlError::Store(_) => ErrorKind::Persistence,
            CrawlError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Only a missing rendering engine aborts a run once it has started.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::EngineUnavailable(_))
    }
}
