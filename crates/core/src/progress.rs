//! Reading progress persistence
//!
//! The last page read is saved to the progress endpoint once navigation has
//! been quiet for a while. Saves are deduplicated against the last page the
//! server acknowledged, and never overlap: a page requested while a save is
//! in flight waits in a latest-wins slot and is sent when that save returns.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use apostila_scheduler::{DebouncedTask, PendingSlot, SingleFlight};

use crate::backend::ViewerBackend;

pub struct ProgressTracker<B> {
    backend: Rc<B>,
    last_persisted: Cell<Option<u32>>,
    saving: SingleFlight,
    pending: PendingSlot<u32>,
    debounce: DebouncedTask,
}

impl<B> ProgressTracker<B>
where
    B: ViewerBackend + 'static,
{
    pub fn new(backend: Rc<B>, save_delay: Duration) -> Self {
        Self {
            backend,
            last_persisted: Cell::new(None),
            saving: SingleFlight::new(),
            pending: PendingSlot::new(),
            debounce: DebouncedTask::new(save_delay),
        }
    }

    /// Page to open the document at
    ///
    /// Falls back to page 1 when there is no progress endpoint, no record,
    /// or the request fails. A page read from the server counts as already
    /// persisted.
    pub async fn load_start_page(&self) -> u32 {
        if !self.backend.has_progress_endpoint() {
            return 1;
        }
        match self.backend.load_progress().await {
            Ok(Some(page)) => {
                self.last_persisted.set(Some(page));
                page
            }
            Ok(None) => 1,
            Err(e) => {
                log::warn!("could not load reading progress: {e}");
                1
            }
        }
    }

    /// Save `page` after the quiet period, replacing any waiting save
    pub fn schedule_save(self: &Rc<Self>, page: u32) {
        if !self.backend.has_progress_endpoint() {
            return;
        }
        let tracker = Rc::downgrade(self);
        self.debounce.schedule(async move {
            if let Some(tracker) = tracker.upgrade() {
                tracker.persist(page, false).await;
            }
        });
    }

    /// Save `page` now
    ///
    /// Skipped when `page` is the last acknowledged page (unless `force`).
    /// While another save is in flight, `page` is queued instead and sent
    /// after it, unless the server acknowledged that page in the meantime.
    /// Failures are logged and dropped.
    pub async fn persist(&self, page: u32, force: bool) {
        if !self.backend.has_progress_endpoint() {
            return;
        }
        if !force && self.last_persisted.get() == Some(page) {
            return;
        }
        let Some(_guard) = self.saving.try_begin() else {
            if let Some(replaced) = self.pending.offer(page) {
                log::trace!("queued progress save of page {page} replaces page {replaced}");
            }
            return;
        };

        let mut next = Some(page);
        while let Some(page) = next {
            match self.backend.save_progress(page).await {
                Ok(Some(acknowledged)) => self.last_persisted.set(Some(acknowledged)),
                Ok(None) => {}
                Err(e) => log::warn!("could not save reading progress (page {page}): {e}"),
            }
            next = self
                .pending
                .take()
                .filter(|queued| self.last_persisted.get() != Some(*queued));
        }
    }

    /// Drop the waiting save, if any
    pub fn cancel_pending(&self) -> bool {
        self.pending.take();
        self.debounce.cancel()
    }

    /// Last page the server acknowledged
    pub fn last_persisted(&self) -> Option<u32> {
        self.last_persisted.get()
    }

    /// Forget the acknowledged page, e.g. when another document opens
    pub fn reset(&self) {
        self.last_persisted.set(None);
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_in_flight()
    }

    /// Whether a debounced save is waiting for its delay
    pub fn has_scheduled_save(&self) -> bool {
        self.debounce.is_pending()
    }
}
