//! Renderer adapter contract
//!
//! The viewer never talks to a PDF library directly. It opens documents
//! through a [`DocumentOpener`] and renders pages through the resulting
//! [`PageRenderer`]. Everything runs on a single thread, so the futures
//! returned here are not required to be `Send`.

use std::path::PathBuf;

use crate::error::{DocumentOpenError, RenderError, RenderResult};
use crate::surface::Surface;

/// Page dimensions in pixels at a given scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width of the bitmap backing this viewport
    pub fn pixel_width(&self) -> u32 {
        self.width.max(0.0).floor() as u32
    }

    /// Height of the bitmap backing this viewport
    pub fn pixel_height(&self) -> u32 {
        self.height.max(0.0).floor() as u32
    }

    /// Whether a bitmap for this viewport would have no pixels
    pub fn is_empty(&self) -> bool {
        self.pixel_width() == 0 || self.pixel_height() == 0
    }

    /// Bitmap size for rendering `page` at `scale` into this viewport
    ///
    /// # Errors
    /// Fails when the bitmap would be empty or too large to allocate.
    pub fn bitmap_size(&self, page: u32, scale: f64) -> RenderResult<(u32, u32)> {
        if self.is_empty() {
            return Err(RenderError::EmptyViewport { page, scale });
        }
        let (width, height) = (self.pixel_width(), self.pixel_height());
        if !Surface::fits(width, height) {
            return Err(RenderError::TooLarge {
                page,
                width,
                height,
            });
        }
        Ok((width, height))
    }
}

/// An opened multi-page document that can render its pages
///
/// Page numbers are 1-based.
#[allow(async_fn_in_trait)]
pub trait PageRenderer {
    /// Total number of pages in the document
    fn page_count(&self) -> u32;

    /// Viewport of `page` at `scale`
    fn viewport(&self, page: u32, scale: f64) -> RenderResult<Viewport>;

    /// Render `page` at `scale` into `surface`
    ///
    /// The caller sizes the surface from [`PageRenderer::viewport`]; the
    /// implementation resizes it if the backend produced different
    /// dimensions.
    async fn render_into(&self, page: u32, scale: f64, surface: &mut Surface) -> RenderResult<()>;
}

/// Where document bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A file on disk
    Path(PathBuf),
    /// An already downloaded document
    Bytes(Vec<u8>),
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&std::path::Path> for DocumentSource {
    fn from(path: &std::path::Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Opens documents for rendering
pub trait DocumentOpener {
    type Document: PageRenderer;

    fn open(&self, source: DocumentSource) -> Result<Self::Document, DocumentOpenError>;
}
