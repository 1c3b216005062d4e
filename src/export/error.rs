use thiserror::Error;

/// Failures surfaced by a video export
#[derive(Debug, Error)]
pub enum ExportError {
    /// The destination cannot encode this container/codec
    #[error("unsupported codec or format: {0}")]
    UnsupportedCodec(String),

    #[error("invalid export job: {0}")]
    InvalidJob(String),

    /// Another export is still running on this engine
    #[error("an export is already in progress")]
    Busy,

    #[error("failed to open encoder: {0}")]
    Open(String),

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The export task ended without reporting (panicked or was dropped)
    #[error("export aborted: {0}")]
    Aborted(String),
}

impl ExportError {
    pub fn is_unsupported_codec(&self) -> bool {
        matches!(self, Self::UnsupportedCodec(_))
    }
}
