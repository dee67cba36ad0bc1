//! Error types for the core library

use doc_model::LayoutError;

/// Errors raised by core operations other than the page pipeline
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Highlights were requested for a page whose viewport is not realized yet.
    ///
    /// Projection is gated on render completion, so this indicates a caller
    /// ordering bug rather than a user-facing condition.
    #[error("page {page} has not been rendered; no viewport to project onto")]
    LayoutUnavailable { page: u32 },

    /// No document is open
    #[error("no document is open")]
    NoDocument,

    /// A newer document selection has replaced the one this call targets
    #[error("document was replaced by a newer selection")]
    Superseded,

    /// A recognized page arrived out of sequence
    #[error("page {got} recognized out of order (expected page {expected})")]
    OutOfOrderPage { expected: u32, got: u32 },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
