//! Error taxonomy for the reader engine

/// Errors surfaced by renderer backends and the render queue
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unsupported document format")]
    UnsupportedFormat,

    #[error("corrupt document: {detail}")]
    CorruptFile { detail: String },

    #[error("render timed out after {timeout_ms}ms for page {page}")]
    DecodeTimeout { page: usize, timeout_ms: u64 },

    #[error("render worker failed to initialize: {detail}")]
    WorkerInitFailure { detail: String },

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptFile {
            detail: detail.into(),
        }
    }

    pub fn worker_init(detail: impl Into<String>) -> Self {
        Self::WorkerInitFailure {
            detail: detail.into(),
        }
    }

    /// True for failures that leave the last rendered page usable.
    /// Open-time failures have no page to fall back to.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnsupportedFormat | Self::CorruptFile { .. })
    }
}

/// Errors from the per-format artifact cache
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("entry of {size} bytes exceeds the entire cache budget of {budget} bytes")]
    EntryTooLarge { size: u64, budget: u64 },
}
