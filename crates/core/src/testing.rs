//! In-memory backend and host page for tests
//!
//! [`MemoryBackend`] answers every endpoint from configurable state and
//! records what it was asked. [`RecordingHost`] records everything the
//! controller shows. Both are single-threaded and cheap to clone where
//! tests need to keep a handle.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use apostila_render::{DocumentSource, Surface};
use tokio::sync::Semaphore;

use crate::backend::{BackendError, DocumentMeta, SearchHit, ViewerBackend};
use crate::controller::HostPage;
use crate::status::{ControlsState, SearchStatus, ViewerStatus};

fn rejected(endpoint: &'static str) -> BackendError {
    BackendError::Rejected {
        endpoint,
        message: None,
    }
}

/// Backend answering from memory
pub struct MemoryBackend {
    meta: RefCell<Result<DocumentMeta, BackendError>>,
    pdf_source: RefCell<Option<DocumentSource>>,
    fetched: RefCell<Vec<String>>,
    progress: Cell<Option<u32>>,
    progress_load_fails: Cell<bool>,
    saves: RefCell<Vec<u32>>,
    saves_fail: Cell<bool>,
    search_results: RefCell<Result<Vec<SearchHit>, BackendError>>,
    searches: RefCell<Vec<String>>,
    progress_endpoint: bool,
    search_endpoint: bool,
    gate: RefCell<Option<Rc<Semaphore>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend with every endpoint configured, no progress and no results
    pub fn new() -> Self {
        Self {
            meta: RefCell::new(Err(rejected("document"))),
            pdf_source: RefCell::new(None),
            fetched: RefCell::new(Vec::new()),
            progress: Cell::new(None),
            progress_load_fails: Cell::new(false),
            saves: RefCell::new(Vec::new()),
            saves_fail: Cell::new(false),
            search_results: RefCell::new(Ok(Vec::new())),
            searches: RefCell::new(Vec::new()),
            progress_endpoint: true,
            search_endpoint: true,
            gate: RefCell::new(None),
        }
    }

    pub fn without_progress_endpoint(mut self) -> Self {
        self.progress_endpoint = false;
        self
    }

    pub fn without_search_endpoint(mut self) -> Self {
        self.search_endpoint = false;
        self
    }

    pub fn set_document(&self, meta: DocumentMeta) {
        *self.meta.borrow_mut() = Ok(meta);
    }

    pub fn fail_document(&self, error: BackendError) {
        *self.meta.borrow_mut() = Err(error);
    }

    /// Source handed out by `fetch_pdf` instead of the URL as a path
    pub fn set_pdf_source(&self, source: DocumentSource) {
        *self.pdf_source.borrow_mut() = Some(source);
    }

    /// URLs passed to `fetch_pdf`
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }

    pub fn set_progress(&self, page: Option<u32>) {
        self.progress.set(page);
    }

    pub fn fail_progress_load(&self) {
        self.progress_load_fails.set(true);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.saves_fail.set(fail);
    }

    /// Pages sent to `save_progress`, in order, including failed saves
    pub fn saved_pages(&self) -> Vec<u32> {
        self.saves.borrow().clone()
    }

    pub fn set_search_results(&self, results: Result<Vec<SearchHit>, BackendError>) {
        *self.search_results.borrow_mut() = results;
    }

    /// Terms passed to `search`
    pub fn searches(&self) -> Vec<String> {
        self.searches.borrow().clone()
    }

    /// Hold saves and searches after they are recorded until [`MemoryBackend::resume`]
    pub fn pause(&self) {
        self.gate
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(Semaphore::new(0)));
    }

    pub fn resume(&self) {
        if let Some(gate) = self.gate.borrow_mut().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    async fn respond(&self) {
        tokio::task::yield_now().await;
        let gate = self.gate.borrow().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
    }
}

impl ViewerBackend for MemoryBackend {
    async fn document_meta(&self) -> Result<DocumentMeta, BackendError> {
        tokio::task::yield_now().await;
        self.meta.borrow().clone()
    }

    async fn fetch_pdf(&self, url: &str) -> Result<DocumentSource, BackendError> {
        self.fetched.borrow_mut().push(url.to_string());
        tokio::task::yield_now().await;
        Ok(self
            .pdf_source
            .borrow()
            .clone()
            .unwrap_or_else(|| DocumentSource::Path(PathBuf::from(url))))
    }

    async fn load_progress(&self) -> Result<Option<u32>, BackendError> {
        tokio::task::yield_now().await;
        if self.progress_load_fails.get() {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        Ok(self.progress.get())
    }

    async fn save_progress(&self, page: u32) -> Result<Option<u32>, BackendError> {
        self.saves.borrow_mut().push(page);
        self.respond().await;
        if self.saves_fail.get() {
            return Err(rejected("progress"));
        }
        self.progress.set(Some(page));
        Ok(Some(page))
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, BackendError> {
        self.searches.borrow_mut().push(term.to_string());
        self.respond().await;
        self.search_results.borrow().clone()
    }

    fn has_progress_endpoint(&self) -> bool {
        self.progress_endpoint
    }

    fn has_search_endpoint(&self) -> bool {
        self.search_endpoint
    }
}

/// A page handed to the host
#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// Top-left pixel
    pub pixel: Option<[u8; 4]>,
}

#[derive(Default)]
struct HostLog {
    statuses: RefCell<Vec<ViewerStatus>>,
    titles: RefCell<Vec<String>>,
    presented: RefCell<Vec<Presented>>,
    hidden: Cell<usize>,
    controls: RefCell<Vec<ControlsState>>,
    search_statuses: RefCell<Vec<SearchStatus>>,
    search_results: RefCell<Vec<Vec<SearchHit>>>,
    width: Cell<Option<f64>>,
}

/// Host page that records everything it is told
#[derive(Clone, Default)]
pub struct RecordingHost {
    log: Rc<HostLog>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host reporting a viewer `width` pixels wide
    pub fn with_width(width: f64) -> Self {
        let host = Self::new();
        host.set_width(Some(width));
        host
    }

    pub fn set_width(&self, width: Option<f64>) {
        self.log.width.set(width);
    }

    pub fn statuses(&self) -> Vec<ViewerStatus> {
        self.log.statuses.borrow().clone()
    }

    pub fn last_status(&self) -> Option<ViewerStatus> {
        self.log.statuses.borrow().last().cloned()
    }

    pub fn titles(&self) -> Vec<String> {
        self.log.titles.borrow().clone()
    }

    pub fn presented(&self) -> Vec<Presented> {
        self.log.presented.borrow().clone()
    }

    /// Pages handed to the host, in order
    pub fn presented_pages(&self) -> Vec<u32> {
        self.log.presented.borrow().iter().map(|p| p.page).collect()
    }

    /// How many times the display surface was hidden
    pub fn hidden_count(&self) -> usize {
        self.log.hidden.get()
    }

    pub fn last_controls(&self) -> Option<ControlsState> {
        self.log.controls.borrow().last().copied()
    }

    pub fn search_statuses(&self) -> Vec<SearchStatus> {
        self.log.search_statuses.borrow().clone()
    }

    pub fn search_results(&self) -> Vec<Vec<SearchHit>> {
        self.log.search_results.borrow().clone()
    }
}

impl HostPage for RecordingHost {
    fn set_status(&self, status: &ViewerStatus) {
        self.log.statuses.borrow_mut().push(status.clone());
    }

    fn set_title(&self, title: &str) {
        self.log.titles.borrow_mut().push(title.to_string());
    }

    fn present(&self, page: u32, surface: &Surface) {
        self.log.presented.borrow_mut().push(Presented {
            page,
            width: surface.width(),
            height: surface.height(),
            pixel: surface.pixel(0, 0),
        });
    }

    fn hide_surface(&self) {
        self.log.hidden.set(self.log.hidden.get() + 1);
    }

    fn update_controls(&self, controls: &ControlsState) {
        self.log.controls.borrow_mut().push(*controls);
    }

    fn search_status(&self, status: &SearchStatus) {
        self.log.search_statuses.borrow_mut().push(status.clone());
    }

    fn show_search_results(&self, hits: &[SearchHit]) {
        self.log.search_results.borrow_mut().push(hits.to_vec());
    }

    fn viewer_width(&self) -> Option<f64> {
        self.log.width.get()
    }
}
