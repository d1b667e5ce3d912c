//! Error types for Trimline.

use thiserror::Error;

/// Main error type for Trimline operations.
///
/// Transient decode hiccups during playback are deliberately *not*
/// represented here: a failed frame read is an absence (`None`), never an
/// error. Only opening a source and exporting surface hard failures.
#[derive(Error, Debug)]
pub enum TrimlineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No decode backend could open: {0}")]
    Open(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Export cancelled")]
    ExportCancelled,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Trimline operations.
pub type Result<T> = std::result::Result<T, TrimlineError>;
