//! In-memory renderer for tests
//!
//! [`FakeRenderer`] produces solid-colour bitmaps whose first two channels
//! encode the page number and the scale, and records every render call so
//! tests can count real renders. Clones share the same call log.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tokio::sync::Semaphore;

use crate::adapter::{DocumentOpener, DocumentSource, PageRenderer, Viewport};
use crate::error::{DocumentOpenError, RenderError, RenderResult};
use crate::surface::Surface;

/// One call to [`PageRenderer::render_into`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCall {
    pub page: u32,
    pub scale: f64,
}

struct FakeState {
    page_count: u32,
    page_width: f64,
    page_height: f64,
    calls: RefCell<Vec<RenderCall>>,
    failing: RefCell<HashSet<u32>>,
    gate: RefCell<Option<Rc<Semaphore>>>,
}

/// Renderer with configurable page geometry and injectable failures
#[derive(Clone)]
pub struct FakeRenderer {
    state: Rc<FakeState>,
}

impl FakeRenderer {
    /// Document of `page_count` pages sized 100x140 at scale 1
    pub fn new(page_count: u32) -> Self {
        Self::with_page_size(page_count, 100.0, 140.0)
    }

    pub fn with_page_size(page_count: u32, page_width: f64, page_height: f64) -> Self {
        Self {
            state: Rc::new(FakeState {
                page_count,
                page_width,
                page_height,
                calls: RefCell::new(Vec::new()),
                failing: RefCell::new(HashSet::new()),
                gate: RefCell::new(None),
            }),
        }
    }

    /// Make every future render of `page` fail
    pub fn fail_page(&self, page: u32) {
        self.state.failing.borrow_mut().insert(page);
    }

    /// Let `page` render again
    pub fn heal_page(&self, page: u32) {
        self.state.failing.borrow_mut().remove(&page);
    }

    /// Hold every render after it is recorded until [`FakeRenderer::resume`]
    pub fn pause(&self) {
        self.state
            .gate
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(Semaphore::new(0)));
    }

    /// Release held renders and stop holding new ones
    pub fn resume(&self) {
        if let Some(gate) = self.state.gate.borrow_mut().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Every render call so far, in order
    pub fn calls(&self) -> Vec<RenderCall> {
        self.state.calls.borrow().clone()
    }

    /// Pages rendered so far, in order
    pub fn rendered_pages(&self) -> Vec<u32> {
        self.state.calls.borrow().iter().map(|c| c.page).collect()
    }

    /// Number of renders of `page`
    pub fn render_count(&self, page: u32) -> usize {
        self.state
            .calls
            .borrow()
            .iter()
            .filter(|c| c.page == page)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.calls.borrow_mut().clear();
    }

    /// Colour a render of `page` at `scale` fills its surface with
    pub fn colour_for(page: u32, scale: f64) -> [u8; 4] {
        [page as u8, (scale * 10.0).round() as u8, 0, 255]
    }
}

impl PageRenderer for FakeRenderer {
    fn page_count(&self) -> u32 {
        self.state.page_count
    }

    fn viewport(&self, page: u32, scale: f64) -> RenderResult<Viewport> {
        if page == 0 || page > self.state.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                total: self.state.page_count,
            });
        }
        Ok(Viewport::new(
            self.state.page_width * scale,
            self.state.page_height * scale,
        ))
    }

    async fn render_into(&self, page: u32, scale: f64, surface: &mut Surface) -> RenderResult<()> {
        self.state.calls.borrow_mut().push(RenderCall { page, scale });

        // Suspension point, like awaiting a real render.
        tokio::task::yield_now().await;
        let gate = self.state.gate.borrow().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        if self.state.failing.borrow().contains(&page) {
            return Err(RenderError::Backend {
                page,
                message: "injected failure".to_string(),
            });
        }

        let (width, height) = self.viewport(page, scale)?.bitmap_size(page, scale)?;
        surface.resize(width, height);
        surface.fill(Self::colour_for(page, scale));
        Ok(())
    }
}

/// Opener that hands out clones of one [`FakeRenderer`]
pub struct FakeOpener {
    renderer: FakeRenderer,
    opened: RefCell<Vec<DocumentSource>>,
    fail_with: Option<DocumentOpenError>,
}

impl FakeOpener {
    pub fn new(renderer: FakeRenderer) -> Self {
        Self {
            renderer,
            opened: RefCell::new(Vec::new()),
            fail_with: None,
        }
    }

    /// Opener whose every `open` fails with `error`
    pub fn failing(error: DocumentOpenError) -> Self {
        Self {
            renderer: FakeRenderer::new(1),
            opened: RefCell::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    /// Sources passed to `open`, in order
    pub fn opened(&self) -> Vec<DocumentSource> {
        self.opened.borrow().clone()
    }
}

impl DocumentOpener for FakeOpener {
    type Document = FakeRenderer;

    fn open(&self, source: DocumentSource) -> Result<FakeRenderer, DocumentOpenError> {
        self.opened.borrow_mut().push(source);
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(self.renderer.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_render_fills_with_page_colour() {
        let renderer = FakeRenderer::new(5);
        let mut surface = Surface::new(1, 1);

        renderer.render_into(3, 1.5, &mut surface).await.unwrap();

        assert_eq!((surface.width(), surface.height()), (150, 210));
        assert_eq!(surface.pixel(0, 0), Some(FakeRenderer::colour_for(3, 1.5)));
        assert_eq!(renderer.rendered_pages(), vec![3]);
    }

    #[tokio::test]
    async fn injected_failure_is_reported() {
        let renderer = FakeRenderer::new(5);
        renderer.fail_page(2);
        let mut surface = Surface::default();

        let err = renderer.render_into(2, 1.0, &mut surface).await.unwrap_err();
        assert!(matches!(err, RenderError::Backend { page: 2, .. }));

        renderer.heal_page(2);
        assert!(renderer.render_into(2, 1.0, &mut surface).await.is_ok());
    }

    #[tokio::test]
    async fn paused_renders_wait_for_resume() {
        let renderer = FakeRenderer::new(2);
        renderer.pause();
        let local = tokio::task::LocalSet::new();

        let done = local
            .run_until(async {
                let r = renderer.clone();
                let task = tokio::task::spawn_local(async move {
                    let mut surface = Surface::default();
                    r.render_into(1, 1.0, &mut surface).await
                });
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                assert!(!task.is_finished());
                renderer.resume();
                task.await.unwrap()
            })
            .await;

        assert!(done.is_ok());
    }

    #[test]
    fn viewport_rejects_out_of_range_pages() {
        let renderer = FakeRenderer::new(2);
        assert!(renderer.viewport(0, 1.0).is_err());
        assert!(renderer.viewport(3, 1.0).is_err());
        assert!(renderer.viewport(2, 1.0).is_ok());
    }
}
