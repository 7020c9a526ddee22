//! Renderer errors

/// Errors produced while rendering a page
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Page number outside `[1, total]`
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// The page's viewport at the requested scale has no pixels
    #[error("page {page} has an empty viewport at scale {scale}")]
    EmptyViewport { page: u32, scale: f64 },

    /// The page's bitmap at the requested scale is too large to allocate
    #[error("page {page} is too large to render ({width}x{height} pixels)")]
    TooLarge { page: u32, width: u32, height: u32 },

    /// The rendering backend failed to produce a bitmap
    #[error("failed to render page {page}: {message}")]
    Backend { page: u32, message: String },
}

/// Errors produced while opening a document
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentOpenError {
    /// The rendering library could not be loaded
    #[error("PDFium initialization error: {0}")]
    Initialization(String),

    /// The document bytes could not be parsed
    #[error("PDF load error: {0}")]
    Load(String),

    /// The document opened but has no pages
    #[error("document has no pages")]
    Empty,
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;
