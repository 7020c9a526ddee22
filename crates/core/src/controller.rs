//! Viewer controller
//!
//! Owns the open document, the current page and zoom, and the render cache,
//! and drives renders one at a time:
//!
//! - A page requested while a render is running is queued; only the latest
//!   queued page is rendered once the current render finishes.
//! - Each render fits the page to the viewer width, multiplies by the zoom
//!   factor, renders through the cache, hands the bitmap to the host page,
//!   trims the cache to the window and starts a background prefetch.
//! - Reading progress is saved once navigation goes quiet.
//!
//! Everything runs on one thread; render drivers and prefetches are tasks on
//! the current `LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use apostila_cache::PageCache;
use apostila_render::{
    DocumentOpenError, DocumentOpener, PageRenderer, RenderError, RenderResult, Surface,
};
use apostila_scheduler::{FlightGuard, PendingSlot, SingleFlight};
use tokio::sync::watch;

use crate::backend::{leading_integer, BackendError, SearchHit, ViewerBackend};
use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::input::{Pinch, Swipe, ViewerCommand};
use crate::prefetch::PrefetchCoordinator;
use crate::progress::ProgressTracker;
use crate::search::{normalize_term, run_search, SearchOutcome};
use crate::status::{zoom_percent, ControlsState, SearchStatus, ViewerStatus};

/// The page hosting the viewer
///
/// Receives status lines, rendered pages and control state. Only
/// [`HostPage::set_status`] and [`HostPage::present`] are required.
pub trait HostPage {
    fn set_status(&self, status: &ViewerStatus);

    /// Document heading, e.g. `"Apostila (120 paginas)"`
    fn set_title(&self, _title: &str) {}

    /// Show `surface`, which now holds `page`
    fn present(&self, page: u32, surface: &Surface);

    /// The display surface has nothing to show
    fn hide_surface(&self) {}

    fn update_controls(&self, _controls: &ControlsState) {}

    fn search_status(&self, _status: &SearchStatus) {}

    fn show_search_results(&self, _hits: &[SearchHit]) {}

    /// Current width of the viewer area, if the host knows it
    fn viewer_width(&self) -> Option<f64> {
        None
    }
}

/// Render state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Rendering,
    /// Rendering, with another page waiting
    RenderQueued,
}

/// What became of a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRequest {
    /// A render driver started with this page
    Started,
    /// A render is running; the page will be rendered after it
    Queued,
    /// No document is open
    Ignored,
}

/// Result of [`ViewerController::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Render(RenderRequest),
    Search(SearchOutcome),
}

struct OpenDocument<R> {
    renderer: Rc<R>,
    total_pages: u32,
    generation: u64,
}

impl<R> Clone for OpenDocument<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Rc::clone(&self.renderer),
            total_pages: self.total_pages,
            generation: self.generation,
        }
    }
}

struct Inner<R, B, H> {
    config: ViewerConfig,
    backend: Rc<B>,
    host: H,
    cache: PageCache,
    prefetch: PrefetchCoordinator,
    progress: Rc<ProgressTracker<B>>,
    document: RefCell<Option<OpenDocument<R>>>,
    generation: Cell<u64>,
    title: RefCell<Option<String>>,
    page: Cell<u32>,
    zoom: Cell<f64>,
    width_override: Cell<Option<f64>>,
    display: RefCell<Surface>,
    rendering: SingleFlight,
    queued: PendingSlot<u32>,
    phase: watch::Sender<RenderPhase>,
    searching: SingleFlight,
}

/// Page viewer over a renderer `R`, a backend `B` and a host page `H`
///
/// Cloning yields another handle to the same viewer.
pub struct ViewerController<R, B, H> {
    inner: Rc<Inner<R, B, H>>,
}

impl<R, B, H> Clone for ViewerController<R, B, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Puts the render phase back to idle when a render driver ends, including
/// by unwinding
struct IdleOnExit<'a>(&'a watch::Sender<RenderPhase>);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.send_replace(RenderPhase::Idle);
    }
}

fn clamp_page(page: i64, total: u32) -> u32 {
    page.clamp(1, i64::from(total.max(1))) as u32
}

impl<R, B, H> ViewerController<R, B, H>
where
    R: PageRenderer + 'static,
    B: ViewerBackend + 'static,
    H: HostPage + 'static,
{
    pub fn new(config: ViewerConfig, backend: B, host: H) -> Self {
        let backend = Rc::new(backend);
        let progress = Rc::new(ProgressTracker::new(
            Rc::clone(&backend),
            config.progress_save_delay(),
        ));
        let (phase, _) = watch::channel(RenderPhase::Idle);

        Self {
            inner: Rc::new(Inner {
                config,
                backend,
                host,
                cache: PageCache::new(),
                prefetch: PrefetchCoordinator::new(),
                progress,
                document: RefCell::new(None),
                generation: Cell::new(0),
                title: RefCell::new(None),
                page: Cell::new(1),
                zoom: Cell::new(1.0),
                width_override: Cell::new(None),
                display: RefCell::new(Surface::default()),
                rendering: SingleFlight::new(),
                queued: PendingSlot::new(),
                phase,
                searching: SingleFlight::new(),
            }),
        }
    }

    // --- document lifecycle ---

    /// Load the active document the way the reading page does
    ///
    /// Fetches the metadata, shows the title, fetches the PDF (metadata URL
    /// first, configured URL as fallback), opens it and renders the page
    /// the reader stopped at. Every failure is also reported as a status.
    pub async fn load_document<O>(&self, opener: &O) -> ViewerResult<RenderRequest>
    where
        O: DocumentOpener<Document = R>,
    {
        self.status(ViewerStatus::FetchingMetadata);
        let meta = match self.inner.backend.document_meta().await {
            Ok(meta) => meta,
            Err(e) => {
                log::error!("could not load document metadata: {e}");
                self.status(match &e {
                    BackendError::Rejected { message, .. } => {
                        ViewerStatus::MetadataUnavailable(message.clone())
                    }
                    _ => ViewerStatus::OpenFailed,
                });
                return Err(e.into());
            }
        };

        let heading = meta.heading();
        self.inner.host.set_title(&heading);
        *self.inner.title.borrow_mut() = Some(heading);

        let Some(url) = meta
            .pdf_url
            .clone()
            .or_else(|| self.inner.config.endpoints.pdf_url.clone())
        else {
            self.status(ViewerStatus::PdfUrlMissing);
            return Err(ViewerError::MissingPdfUrl);
        };

        self.status(ViewerStatus::OpeningDocument);
        let source = match self.inner.backend.fetch_pdf(&url).await {
            Ok(source) => source,
            Err(e) => {
                log::error!("could not fetch {url}: {e}");
                self.status(ViewerStatus::OpenFailed);
                return Err(e.into());
            }
        };
        let renderer = match opener.open(source) {
            Ok(renderer) => renderer,
            Err(e) => {
                log::error!("could not open {url}: {e}");
                self.status(ViewerStatus::OpenFailed);
                return Err(e.into());
            }
        };

        self.open_document(renderer).await
    }

    /// Install an opened document and render its start page
    ///
    /// The cache is cleared, pending work for the previous document is
    /// dropped, and the start page comes from the progress endpoint.
    pub async fn open_document(&self, renderer: R) -> ViewerResult<RenderRequest> {
        let total_pages = renderer.page_count();
        if total_pages == 0 {
            self.status(ViewerStatus::OpenFailed);
            return Err(DocumentOpenError::Empty.into());
        }

        self.discard_document_state();
        let generation = self.inner.generation.get();
        *self.inner.document.borrow_mut() = Some(OpenDocument {
            renderer: Rc::new(renderer),
            total_pages,
            generation,
        });
        log::info!("opened document with {total_pages} pages");

        let start = self.inner.progress.load_start_page().await;
        if self.inner.generation.get() != generation {
            return Ok(RenderRequest::Ignored);
        }
        let start = clamp_page(i64::from(start), total_pages);
        self.inner.page.set(start);
        self.push_controls();
        Ok(self.request_page(i64::from(start)))
    }

    /// Close the document and release every bitmap
    pub fn unload(&self) {
        self.discard_document_state();
        *self.inner.document.borrow_mut() = None;
        *self.inner.title.borrow_mut() = None;
        self.inner.display.borrow_mut().release();
        self.inner.host.hide_surface();
        self.push_controls();
    }

    fn discard_document_state(&self) {
        self.inner.generation.set(self.inner.generation.get() + 1);
        if self.inner.prefetch.cancel() {
            log::debug!("cancelled prefetch of the previous document");
        }
        self.inner.progress.cancel_pending();
        self.inner.progress.reset();
        self.inner.queued.take();
        self.inner.cache.clear();
    }

    // --- rendering ---

    /// Render `page` (clamped to the document), or queue it behind the
    /// running render
    pub fn request_page(&self, page: i64) -> RenderRequest {
        let Some(total) = self.total_pages() else {
            return RenderRequest::Ignored;
        };
        let page = clamp_page(page, total);

        let Some(guard) = self.inner.rendering.try_begin() else {
            if let Some(dropped) = self.inner.queued.offer(page) {
                log::trace!("page {page} replaces queued page {dropped}");
            }
            self.set_phase(RenderPhase::RenderQueued);
            return RenderRequest::Queued;
        };

        self.inner.page.set(page);
        self.set_phase(RenderPhase::Rendering);
        let this = self.clone();
        tokio::task::spawn_local(async move { this.drive_renders(guard, page).await });
        RenderRequest::Started
    }

    async fn drive_renders(self, guard: FlightGuard, first: u32) {
        let idle = IdleOnExit(&self.inner.phase);
        let mut page = first;
        loop {
            self.render_cycle(page).await;
            match self.inner.queued.take() {
                Some(next) => {
                    page = next;
                    self.inner.page.set(page);
                    self.set_phase(RenderPhase::Rendering);
                }
                None => break,
            }
        }
        drop(guard);
        drop(idle);
        self.push_controls();
    }

    async fn render_cycle(&self, page: u32) {
        let Some(document) = self.inner.document.borrow().clone() else {
            return;
        };
        self.inner.prefetch.follow(page);
        self.push_controls();
        self.status(ViewerStatus::Rendering(page));

        match self.render_page(&document, page).await {
            Ok(true) => {}
            Ok(false) => log::debug!("render of page {page} belongs to a closed document"),
            Err(e) => {
                log::error!("failed to render page {page}: {e}");
                if self.is_current(&document) {
                    self.status(ViewerStatus::RenderFailed);
                }
            }
        }
    }

    async fn render_page(&self, document: &OpenDocument<R>, page: u32) -> RenderResult<bool> {
        let renderer = document.renderer.as_ref();
        let cache = &self.inner.cache;

        let scale = self.render_scale(renderer, page)?;
        cache.adopt_scale(scale);
        cache.ensure_cached(renderer, page, scale).await?;
        if !self.is_current(document) {
            return Ok(false);
        }

        let shown = {
            let mut display = self.inner.display.borrow_mut();
            let shown = cache.draw(page, &mut display);
            if shown {
                self.inner.host.present(page, &display);
            }
            shown
        };
        if !shown {
            log::debug!("page {page} left the cache before it could be drawn");
            self.inner.host.hide_surface();
        }

        cache.trim_to_window(page, document.total_pages);
        self.inner
            .prefetch
            .spawn(Rc::clone(&document.renderer), cache.clone(), page, scale);

        let zoom = (!self.inner.config.layout.compact_status).then(|| zoom_percent(self.zoom()));
        self.status(ViewerStatus::PageShown {
            page,
            total: document.total_pages,
            zoom_percent: zoom,
        });
        self.inner.progress.schedule_save(page);
        Ok(true)
    }

    /// Fit-to-width scale of `page` times the zoom factor
    fn render_scale(&self, renderer: &R, page: u32) -> RenderResult<f64> {
        let base = renderer.viewport(page, 1.0)?;
        if !(base.width > 0.0) {
            return Err(RenderError::EmptyViewport { page, scale: 1.0 });
        }
        let available = self
            .inner
            .config
            .layout
            .available_width(self.viewer_width());
        Ok(available / base.width * self.zoom())
    }

    fn is_current(&self, document: &OpenDocument<R>) -> bool {
        self.inner.generation.get() == document.generation
    }

    // --- navigation ---

    /// Go to a page typed by the reader
    ///
    /// The leading integer of `raw` is used; input without one reports an
    /// invalid page and leaves the viewer where it is.
    pub fn goto_page(&self, raw: &str) -> ViewerResult<RenderRequest> {
        if self.total_pages().is_none() {
            return Err(ViewerError::NoDocument);
        }
        match leading_integer(raw) {
            Some(page) => Ok(self.request_page(page)),
            None => {
                self.status(ViewerStatus::InvalidPageInput);
                self.push_controls();
                Err(ViewerError::InvalidPageInput(raw.to_string()))
            }
        }
    }

    pub fn next_page(&self) -> RenderRequest {
        self.request_page(i64::from(self.page()) + 1)
    }

    pub fn prev_page(&self) -> RenderRequest {
        self.request_page(i64::from(self.page()) - 1)
    }

    /// Jump to the page of a search result
    pub fn open_search_hit(&self, hit: &SearchHit) -> RenderRequest {
        self.request_page(i64::from(hit.page))
    }

    // --- zoom and layout ---

    /// Set the zoom factor (clamped) and re-render the current page
    pub fn set_zoom(&self, zoom: f64) -> RenderRequest {
        self.inner.zoom.set(self.inner.config.zoom.clamp(zoom));
        self.request_page(i64::from(self.page()))
    }

    pub fn zoom_in(&self) -> RenderRequest {
        self.set_zoom(self.zoom() + self.inner.config.zoom.step)
    }

    pub fn zoom_out(&self) -> RenderRequest {
        self.set_zoom(self.zoom() - self.inner.config.zoom.step)
    }

    pub fn reset_zoom(&self) -> RenderRequest {
        self.set_zoom(1.0)
    }

    /// The viewer area is now `width` pixels wide
    ///
    /// Widths that are not positive and finite are ignored.
    pub fn resize(&self, width: f64) -> RenderRequest {
        if !(width.is_finite() && width > 0.0) {
            log::warn!("ignoring viewer width {width}");
            return RenderRequest::Ignored;
        }
        self.inner.width_override.set(Some(width));
        self.request_page(i64::from(self.page()))
    }

    /// Width pages are fitted to: last resize, then the host, then config
    pub fn viewer_width(&self) -> f64 {
        self.inner
            .width_override
            .get()
            .or_else(|| {
                self.inner
                    .host
                    .viewer_width()
                    .filter(|width| width.is_finite() && *width > 0.0)
            })
            .unwrap_or(self.inner.config.layout.viewer_width)
    }

    // --- search ---

    /// Search the document for `raw` (trimmed)
    ///
    /// Statuses and results go to the host. A search while another one is
    /// running returns [`SearchOutcome::Busy`] without doing anything.
    pub async fn search(&self, raw: &str) -> SearchOutcome {
        if self.total_pages().is_none() || !self.inner.backend.has_search_endpoint() {
            return SearchOutcome::Unavailable;
        }
        let Some(term) = normalize_term(raw) else {
            self.inner.host.show_search_results(&[]);
            self.search_status(&SearchOutcome::EmptyTerm);
            return SearchOutcome::EmptyTerm;
        };
        let Some(guard) = self.inner.searching.try_begin() else {
            return SearchOutcome::Busy;
        };

        self.push_controls();
        self.inner
            .host
            .search_status(&SearchStatus::Searching(term.to_string()));

        let outcome = run_search(self.inner.backend.as_ref(), term).await;
        self.inner.host.show_search_results(outcome.hits());
        self.search_status(&outcome);

        drop(guard);
        self.push_controls();
        outcome
    }

    fn search_status(&self, outcome: &SearchOutcome) {
        if let Some(status) = outcome.status() {
            self.inner.host.search_status(&status);
        }
    }

    // --- commands ---

    pub async fn dispatch(&self, command: ViewerCommand) -> ViewerResult<CommandOutcome> {
        log::debug!("command: {command}");
        let request = match command {
            ViewerCommand::Next => self.next_page(),
            ViewerCommand::Prev => self.prev_page(),
            ViewerCommand::GoTo(raw) => self.goto_page(&raw)?,
            ViewerCommand::ZoomIn => self.zoom_in(),
            ViewerCommand::ZoomOut => self.zoom_out(),
            ViewerCommand::ResetZoom => self.reset_zoom(),
            ViewerCommand::Resize(width) => self.resize(width),
            ViewerCommand::Search(term) => {
                return Ok(CommandOutcome::Search(self.search(&term).await));
            }
        };
        Ok(CommandOutcome::Render(request))
    }

    // --- gestures ---

    /// Act on a key press (`KeyboardEvent.key` names)
    ///
    /// Returns `None` for keys without a shortcut.
    pub fn handle_key(&self, key: &str) -> Option<RenderRequest> {
        let request = match ViewerCommand::from_key(key)? {
            ViewerCommand::Next => self.next_page(),
            ViewerCommand::Prev => self.prev_page(),
            ViewerCommand::ZoomIn => self.zoom_in(),
            ViewerCommand::ZoomOut => self.zoom_out(),
            ViewerCommand::ResetZoom => self.reset_zoom(),
            ViewerCommand::GoTo(_) | ViewerCommand::Resize(_) | ViewerCommand::Search(_) => {
                return None;
            }
        };
        Some(request)
    }

    /// Act on a finished one-finger gesture that travelled `dx`, `dy`
    ///
    /// Swipes turn the page unless the reader is zoomed in.
    pub fn handle_swipe(&self, dx: f64, dy: f64, duration_ms: u64) -> Option<RenderRequest> {
        match Swipe::classify(dx, dy, duration_ms, self.is_zoom_active())? {
            ViewerCommand::Next => Some(self.next_page()),
            ViewerCommand::Prev => Some(self.prev_page()),
            _ => None,
        }
    }

    /// Two fingers touched down `distance` pixels apart
    pub fn begin_pinch(&self, distance: f64) -> Pinch {
        Pinch::start(distance, self.zoom())
    }

    /// The fingers moved to `distance`; returns the zoom to preview
    pub fn update_pinch(&self, pinch: &mut Pinch, distance: f64) -> f64 {
        pinch.update(distance, &self.inner.config.zoom)
    }

    /// The fingers lifted; zooms and re-renders if the pinch moved enough
    pub fn end_pinch(&self, pinch: Pinch) -> Option<RenderRequest> {
        pinch.finish(self.zoom()).map(|zoom| self.set_zoom(zoom))
    }

    // --- state ---

    /// Wait until no render is running or queued
    pub async fn wait_idle(&self) {
        let mut phase = self.inner.phase.subscribe();
        if phase
            .wait_for(|phase| *phase == RenderPhase::Idle)
            .await
            .is_err()
        {
            log::trace!("render phase channel closed");
        }
    }

    /// Wait for renders and the last prefetch to finish
    pub async fn settle(&self) {
        self.wait_idle().await;
        self.inner.prefetch.settle().await;
    }

    pub fn phase(&self) -> RenderPhase {
        *self.inner.phase.borrow()
    }

    /// Receiver for render phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<RenderPhase> {
        self.inner.phase.subscribe()
    }

    pub fn controls(&self) -> ControlsState {
        let total = self.total_pages().unwrap_or(0);
        let has_document = total > 0;
        let page = self.page();
        let rendering = self.inner.rendering.is_in_flight();
        let searching = self.inner.searching.is_in_flight();
        let zoom = self.zoom();

        ControlsState {
            has_document,
            page,
            total_pages: total,
            render_in_progress: rendering,
            zoom_percent: zoom_percent(zoom),
            zoom_active: zoom > self.inner.config.zoom.active_threshold,
            can_go_prev: has_document && page > 1 && !rendering,
            can_go_next: has_document && page < total && !rendering,
            input_enabled: has_document && !rendering,
            search_enabled: has_document
                && self.inner.backend.has_search_endpoint()
                && !searching,
            search_in_progress: searching,
        }
    }

    /// Current page (the one being rendered while a render runs)
    pub fn page(&self) -> u32 {
        self.inner.page.get()
    }

    pub fn zoom(&self) -> f64 {
        self.inner.zoom.get()
    }

    pub fn is_zoom_active(&self) -> bool {
        self.zoom() > self.inner.config.zoom.active_threshold
    }

    /// Page count of the open document
    pub fn total_pages(&self) -> Option<u32> {
        self.inner.document.borrow().as_ref().map(|d| d.total_pages)
    }

    /// Heading of the document loaded through [`ViewerController::load_document`]
    pub fn title(&self) -> Option<String> {
        self.inner.title.borrow().clone()
    }

    pub fn cache(&self) -> &PageCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn progress(&self) -> &ProgressTracker<B> {
        &self.inner.progress
    }

    pub fn is_prefetching(&self) -> bool {
        self.inner.prefetch.is_running()
    }

    fn set_phase(&self, phase: RenderPhase) {
        self.inner.phase.send_replace(phase);
    }

    fn status(&self, status: ViewerStatus) {
        log::debug!("status: {status}");
        self.inner.host.set_status(&status);
    }

    fn push_controls(&self) {
        self.inner.host.update_controls(&self.controls());
    }
}
