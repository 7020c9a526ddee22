//! Apostila Render Library
//!
//! Renderer adapter for the page viewer: the traits the viewer renders
//! through, the pixel surfaces it renders into, and a PDFium-backed
//! implementation.

pub mod adapter;
pub mod error;
pub mod pdf;
pub mod surface;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapter::{DocumentOpener, DocumentSource, PageRenderer, Viewport};
pub use error::{DocumentOpenError, RenderError, RenderResult};
pub use pdf::{PdfiumOpener, PdfiumRenderer};
pub use surface::{Surface, BYTES_PER_PIXEL};
