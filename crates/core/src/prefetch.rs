//! Background prefetch of the pages around the one being read
//!
//! After a page is shown, its neighbours are rendered into the cache so the
//! next navigation is a cache hit. At most one prefetch runs at a time; a
//! request while one is running waits behind it, and only the latest such
//! request is kept. A run whose page the reader has left stops before its
//! next render and never trims. Prefetch is best-effort: render failures are
//! logged and skipped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use apostila_cache::{PageCache, ScaleToken};
use apostila_render::PageRenderer;
use apostila_scheduler::{PendingSlot, SingleFlight};
use tokio::task::JoinHandle;

/// What one prefetch run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Pages rendered (or found cached) during the run
    pub warmed: Vec<u32>,
    /// Pages whose render failed
    pub failed: Vec<u32>,
    /// Entries evicted by the final trim
    pub evicted: usize,
    /// The cache moved to another scale, or the reader to another page,
    /// before the run finished
    pub abandoned: bool,
}

/// Warm the window around `anchor` at `scale`, then trim the cache
///
/// Pages are rendered one after another. The run stops early if the cache
/// adopts another scale in the meantime, leaving the newer epoch alone.
pub async fn prefetch_window<R>(
    renderer: &R,
    cache: &PageCache,
    anchor: u32,
    scale: f64,
) -> PrefetchReport
where
    R: PageRenderer + ?Sized,
{
    warm_window(renderer, cache, anchor, scale, || false).await
}

/// [`prefetch_window`] that also stops once `moved` reports the reader left
/// `anchor`
async fn warm_window<R, F>(
    renderer: &R,
    cache: &PageCache,
    anchor: u32,
    scale: f64,
    moved: F,
) -> PrefetchReport
where
    R: PageRenderer + ?Sized,
    F: Fn() -> bool,
{
    let total = renderer.page_count();
    let token = ScaleToken::from_scale(scale);
    let stale = || {
        if cache.scale_token().is_some_and(|current| current != token) {
            log::debug!("abandoning prefetch around page {anchor}: scale changed from {token}");
            true
        } else if moved() {
            log::debug!("abandoning prefetch around page {anchor}: the reader moved on");
            true
        } else {
            false
        }
    };
    let mut report = PrefetchReport::default();

    for page in cache.missing_in_window(anchor, total, scale) {
        if stale() {
            report.abandoned = true;
            return report;
        }
        match cache.ensure_cached(renderer, page, scale).await {
            Ok(()) => report.warmed.push(page),
            Err(e) => {
                log::warn!("prefetch of page {page} failed: {e}");
                report.failed.push(page);
            }
        }
    }

    if stale() {
        report.abandoned = true;
        return report;
    }
    report.evicted = cache.trim_to_window(anchor, total);
    report
}

#[derive(Default)]
struct Anchors {
    /// Page the reader is on
    current: Cell<Option<u32>>,
    /// Request parked behind the running prefetch
    queued: PendingSlot<(u32, f64)>,
}

/// Single-flight prefetch runner
#[derive(Default)]
pub struct PrefetchCoordinator {
    flight: RefCell<SingleFlight>,
    task: RefCell<Option<JoinHandle<()>>>,
    anchors: Rc<Anchors>,
}

impl PrefetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a prefetch is running
    pub fn is_running(&self) -> bool {
        self.flight.borrow().is_in_flight()
    }

    /// The reader is now on `anchor`
    ///
    /// A running prefetch around another page stops before its next render.
    pub fn follow(&self, anchor: u32) {
        self.anchors.current.set(Some(anchor));
    }

    /// Start a background prefetch on the current `LocalSet`
    ///
    /// Returns `false` if a prefetch is running. The request then runs right
    /// after it, unless a newer request replaces it first.
    pub fn spawn<R>(&self, renderer: Rc<R>, cache: PageCache, anchor: u32, scale: f64) -> bool
    where
        R: PageRenderer + 'static,
    {
        self.follow(anchor);
        let Some(guard) = self.flight.borrow().try_begin() else {
            match self.anchors.queued.offer((anchor, scale)) {
                Some((dropped, _)) => {
                    log::trace!("prefetch around page {anchor} replaces queued page {dropped}")
                }
                None => log::trace!("prefetch around page {anchor} queued"),
            }
            return false;
        };

        let anchors = Rc::clone(&self.anchors);
        let handle = tokio::task::spawn_local(async move {
            let _guard = guard;
            let (mut anchor, mut scale) = (anchor, scale);
            loop {
                let moved = || anchors.current.get() != Some(anchor);
                let report = warm_window(renderer.as_ref(), &cache, anchor, scale, moved).await;
                log::debug!(
                    "prefetch around page {anchor}: warmed {:?}, failed {:?}, evicted {}",
                    report.warmed,
                    report.failed,
                    report.evicted
                );
                match anchors.queued.take() {
                    Some(next) => (anchor, scale) = next,
                    None => break,
                }
            }
        });
        *self.task.borrow_mut() = Some(handle);
        true
    }

    /// Prefetch in the caller's task
    ///
    /// Returns `None` if a prefetch is already running.
    pub async fn run<R>(
        &self,
        renderer: &R,
        cache: &PageCache,
        anchor: u32,
        scale: f64,
    ) -> Option<PrefetchReport>
    where
        R: PageRenderer + ?Sized,
    {
        let guard = self.flight.borrow().try_begin()?;
        let report = prefetch_window(renderer, cache, anchor, scale).await;
        drop(guard);
        Some(report)
    }

    /// Wait for the last spawned prefetch to finish
    pub async fn settle(&self) {
        let handle = self.task.borrow_mut().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::error!("prefetch task failed: {e}");
                }
            }
        }
    }

    /// Abort the running background prefetch
    ///
    /// Returns `true` if one was running.
    pub fn cancel(&self) -> bool {
        self.anchors.queued.take();
        self.anchors.current.set(None);
        let Some(handle) = self.task.borrow_mut().take() else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }
        handle.abort();
        // The aborted task releases its guard only when the runtime drops it.
        *self.flight.borrow_mut() = SingleFlight::new();
        true
    }
}
