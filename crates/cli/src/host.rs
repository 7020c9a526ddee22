//! Headless host page
//!
//! Prints status lines to stdout and writes every presented page as a PNG.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apostila_core::{HostPage, SearchHit, SearchStatus, ViewerStatus};
use apostila_render::Surface;

pub struct ConsoleHost {
    out_dir: Option<PathBuf>,
    presented: Cell<usize>,
    written: RefCell<Vec<PathBuf>>,
}

impl ConsoleHost {
    /// Host writing pages into `out_dir`, or only printing without one
    pub fn new(out_dir: Option<PathBuf>) -> Self {
        Self {
            out_dir,
            presented: Cell::new(0),
            written: RefCell::new(Vec::new()),
        }
    }

    /// Number of pages presented so far
    pub fn presented_count(&self) -> usize {
        self.presented.get()
    }

    /// PNG files written so far, in order
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.borrow().clone()
    }
}

/// File name of the `index`-th presented page
pub fn page_file_name(index: usize, page: u32) -> String {
    format!("{index:03}-page-{page}.png")
}

/// Write an RGBA surface as a PNG
pub fn write_png(surface: &Surface, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(
        surface.width(),
        surface.height(),
        surface.pixels().to_vec(),
    )
    .context("surface size does not match its pixel buffer")?;
    image
        .save(path)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

impl HostPage for ConsoleHost {
    fn set_status(&self, status: &ViewerStatus) {
        println!("{status}");
    }

    fn set_title(&self, title: &str) {
        println!("# {title}");
    }

    fn present(&self, page: u32, surface: &Surface) {
        let index = self.presented.get() + 1;
        self.presented.set(index);

        let Some(dir) = &self.out_dir else {
            log::info!("page {page} presented ({}x{})", surface.width(), surface.height());
            return;
        };
        let path = dir.join(page_file_name(index, page));
        match write_png(surface, &path) {
            Ok(()) => {
                log::info!("page {page} written to {}", path.display());
                self.written.borrow_mut().push(path);
            }
            Err(e) => log::error!("{e:#}"),
        }
    }

    fn hide_surface(&self) {
        log::debug!("display surface hidden");
    }

    fn search_status(&self, status: &SearchStatus) {
        println!("{status}");
    }

    fn show_search_results(&self, hits: &[SearchHit]) {
        for hit in hits {
            println!("  p. {}: {}", hit.page, hit.excerpt);
        }
    }
}
