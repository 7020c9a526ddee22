//! Viewer errors

use apostila_render::{DocumentOpenError, RenderError};

use crate::backend::BackendError;

/// Errors surfaced by the viewer controller
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// An operation needed an open document
    #[error("no document is open")]
    NoDocument,

    /// Neither the metadata nor the configuration name a PDF URL
    #[error("no PDF URL for the active document")]
    MissingPdfUrl,

    #[error(transparent)]
    Open(#[from] DocumentOpenError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A page number typed by the user did not parse
    #[error("invalid page number: {0:?}")]
    InvalidPageInput(String),
}

/// Result type for viewer operations
pub type ViewerResult<T> = Result<T, ViewerError>;
