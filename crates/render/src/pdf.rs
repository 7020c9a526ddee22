//! PDFium-backed renderer
//!
//! Binds the PDFium shared library once per opener and renders pages into
//! [`Surface`]s at arbitrary scales.

use pdfium_render::prelude::*;

use crate::adapter::{DocumentOpener, DocumentSource, PageRenderer, Viewport};
use crate::error::{DocumentOpenError, RenderError, RenderResult};
use crate::surface::Surface;

/// Opens PDF documents through PDFium
///
/// The bound library is leaked so documents can borrow it for `'static`.
/// Create one opener per process and reuse it.
pub struct PdfiumOpener {
    pdfium: &'static Pdfium,
}

impl PdfiumOpener {
    /// Bind the PDFium library
    ///
    /// Search order:
    /// 1. Executable's directory (for app bundles)
    /// 2. Current working directory
    /// 3. System library paths
    pub fn new() -> Result<Self, DocumentOpenError> {
        let pdfium = Box::leak(Box::new(Self::init_pdfium()?));
        Ok(Self { pdfium })
    }

    fn init_pdfium() -> Result<Pdfium, DocumentOpenError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        if let Some(ref dir) = exe_dir {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
        }

        Ok(Pdfium::new(
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| DocumentOpenError::Initialization(e.to_string()))?,
        ))
    }
}

impl DocumentOpener for PdfiumOpener {
    type Document = PdfiumRenderer;

    fn open(&self, source: DocumentSource) -> Result<PdfiumRenderer, DocumentOpenError> {
        let document = match source {
            DocumentSource::Path(path) => self.pdfium.load_pdf_from_file(&path, None),
            DocumentSource::Bytes(bytes) => self.pdfium.load_pdf_from_byte_vec(bytes, None),
        }
        .map_err(|e| DocumentOpenError::Load(e.to_string()))?;

        let page_count = u32::from(document.pages().len());
        if page_count == 0 {
            return Err(DocumentOpenError::Empty);
        }
        log::debug!("opened PDF with {page_count} pages");

        Ok(PdfiumRenderer {
            document,
            page_count,
        })
    }
}

/// A PDF document opened through [`PdfiumOpener`]
pub struct PdfiumRenderer {
    document: PdfDocument<'static>,
    page_count: u32,
}

impl PdfiumRenderer {
    fn page(&self, page: u32) -> RenderResult<PdfPage<'_>> {
        if page == 0 || page > self.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                total: self.page_count,
            });
        }
        let index = u16::try_from(page - 1).map_err(|_| RenderError::PageOutOfRange {
            page,
            total: self.page_count,
        })?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| RenderError::Backend {
                page,
                message: e.to_string(),
            })
    }

    /// Page size in points (the viewport at scale 1)
    pub fn page_size_pt(&self, page: u32) -> RenderResult<(f32, f32)> {
        let pdf_page = self.page(page)?;
        Ok((pdf_page.width().value, pdf_page.height().value))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn viewport(&self, page: u32, scale: f64) -> RenderResult<Viewport> {
        let (width, height) = self.page_size_pt(page)?;
        Ok(Viewport::new(f64::from(width) * scale, f64::from(height) * scale))
    }

    async fn render_into(&self, page: u32, scale: f64, surface: &mut Surface) -> RenderResult<()> {
        let (width, height) = self.viewport(page, scale)?.bitmap_size(page, scale)?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let pdf_page = self.page(page)?;
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| RenderError::Backend {
                page,
                message: e.to_string(),
            })?;
        let rgba = bitmap.as_rgba_bytes();

        surface.resize(width, height);
        if rgba.len() != surface.byte_len() {
            return Err(RenderError::Backend {
                page,
                message: format!(
                    "bitmap has {} bytes, expected {} for {width}x{height}",
                    rgba.len(),
                    surface.byte_len()
                ),
            });
        }
        surface.pixels_mut().copy_from_slice(&rgba);
        Ok(())
    }
}
