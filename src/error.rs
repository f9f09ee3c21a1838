//! Error taxonomy for acquisition, quality gating and post-processing

use crate::cancel::Cancelled;

/// Failure of one acquisition attempt or of a job's post-processing.
///
/// Quality failures (`TooShort`, `Blocked`) are kept apart from transport
/// failures so the strategy executor can decide whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported content type {0}")]
    UnsupportedContent(String),

    #[error("response too large (max {max_bytes} bytes)")]
    TooLarge { max_bytes: u64 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("content too short ({chars} chars, need {min})")]
    TooShort { chars: usize, min: usize },

    #[error("blocked page detected ({0})")]
    Blocked(String),

    #[error("all strategies failed: {0}")]
    Exhausted(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("stop requested")]
    Cancelled,
}

impl FetchError {
    /// Transport succeeded but the content is not usable.
    pub fn is_quality_failure(&self) -> bool {
        matches!(self, FetchError::TooShort { .. } | FetchError::Blocked(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}
