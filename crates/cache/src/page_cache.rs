//! Scale-keyed page render cache
//!
//! Holds rendered page bitmaps for a single render scale. Adopting a new
//! scale releases every bitmap before anything else is inserted, so at most
//! one scale is ever resident. Entries are evicted by [`EvictionPolicy`].
//!
//! The cache is shared between the active render and the background
//! prefetch, both running on the same thread. Borrows of the inner state
//! never span an `.await`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use apostila_render::{PageRenderer, RenderResult, Surface};

use crate::policy::EvictionPolicy;
use crate::scale::ScaleToken;

/// A rendered page bitmap
#[derive(Debug)]
pub struct CacheEntry {
    surface: Surface,
    token: ScaleToken,
    last_used: u64,
}

impl CacheEntry {
    /// Scale the bitmap was rendered at
    pub fn token(&self) -> ScaleToken {
        self.token
    }

    /// Logical time of the last lookup or draw
    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    fn release(&mut self) {
        self.surface.release();
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub entry_count: usize,

    /// Lookups served from the cache
    pub hits: u64,

    /// Lookups that required a render
    pub misses: u64,

    /// Bitmaps produced by the renderer
    pub renders: u64,

    /// Entries removed by the eviction policy
    pub evictions: u64,

    /// Times the whole cache was cleared for a new scale
    pub invalidations: u64,

    /// Finished renders dropped because the scale changed meanwhile
    pub stale_discards: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Internal cache state
struct CacheState {
    entries: HashMap<u32, CacheEntry>,
    token: Option<ScaleToken>,
    clock: u64,
    policy: EvictionPolicy,
    stats: CacheStats,
}

impl CacheState {
    fn new(policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            token: None,
            clock: 0,
            policy,
            stats: CacheStats::default(),
        }
    }

    /// Advance the logical clock
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Make `token` the current epoch, clearing the cache if it changed
    fn adopt(&mut self, token: ScaleToken) -> bool {
        if self.token == Some(token) {
            return false;
        }
        if !self.entries.is_empty() {
            log::debug!(
                "scale changed {:?} -> {token}, dropping {} cached pages",
                self.token.map(|t| t.to_string()),
                self.entries.len()
            );
            self.stats.invalidations += 1;
        }
        self.clear();
        self.token = Some(token);
        true
    }

    fn clear(&mut self) {
        for entry in self.entries.values_mut() {
            entry.release();
        }
        self.entries.clear();
        self.token = None;
        self.stats.entry_count = 0;
    }

    /// Refresh `page`'s last-used time if it is cached
    fn touch(&mut self, page: u32) -> bool {
        let now = self.tick();
        match self.entries.get_mut(&page) {
            Some(entry) => {
                entry.last_used = now;
                true
            }
            None => false,
        }
    }

    /// Store a finished render
    ///
    /// Renders from an older epoch are released instead of stored, and a
    /// page cached by another path meanwhile keeps its resident bitmap.
    fn insert(&mut self, page: u32, mut surface: Surface, token: ScaleToken) -> bool {
        if self.token != Some(token) {
            log::debug!("discarding page {page} rendered at stale scale {token}");
            surface.release();
            self.stats.stale_discards += 1;
            return false;
        }
        let now = self.tick();
        if let Some(existing) = self.entries.get_mut(&page) {
            existing.last_used = now;
            surface.release();
            return false;
        }
        self.entries.insert(
            page,
            CacheEntry {
                surface,
                token,
                last_used: now,
            },
        );
        self.stats.entry_count = self.entries.len();
        true
    }

    fn evict(&mut self, page: u32) -> bool {
        match self.entries.remove(&page) {
            Some(mut entry) => {
                entry.release();
                self.stats.evictions += 1;
                self.stats.entry_count = self.entries.len();
                true
            }
            None => false,
        }
    }
}

/// Render cache for the pages around the one being read
///
/// Cloning yields another handle to the same cache.
///
/// # Example
///
/// ```
/// use apostila_cache::PageCache;
/// use apostila_render::Surface;
///
/// let cache = PageCache::new();
/// let mut canvas = Surface::default();
///
/// // Nothing rendered yet: drawing hides the target.
/// assert!(!cache.draw(1, &mut canvas));
/// assert!(!canvas.is_visible());
/// ```
#[derive(Clone)]
pub struct PageCache {
    state: Rc<RefCell<CacheState>>,
}

impl PageCache {
    /// Empty cache with the standard window/size policy
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::STANDARD)
    }

    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            state: Rc::new(RefCell::new(CacheState::new(policy))),
        }
    }

    /// Make `scale` the current epoch
    ///
    /// Clears every entry when the rounded scale differs from the current
    /// one. Returns the token now in effect.
    pub fn adopt_scale(&self, scale: f64) -> ScaleToken {
        let token = ScaleToken::from_scale(scale);
        self.state.borrow_mut().adopt(token);
        token
    }

    /// Make sure `page` is cached at `scale`, rendering it if necessary
    ///
    /// Pages outside the document are ignored. A cache hit only refreshes
    /// the entry's last-used time; a miss renders into a fresh surface sized
    /// to the page's viewport. Render errors are returned as-is.
    pub async fn ensure_cached<R>(&self, renderer: &R, page: u32, scale: f64) -> RenderResult<()>
    where
        R: PageRenderer + ?Sized,
    {
        let total = renderer.page_count();
        if page == 0 || page > total {
            log::debug!("ignoring cache request for page {page} of {total}");
            return Ok(());
        }

        let token = ScaleToken::from_scale(scale);
        {
            let mut state = self.state.borrow_mut();
            state.adopt(token);
            if state.touch(page) {
                state.stats.hits += 1;
                return Ok(());
            }
            state.stats.misses += 1;
        }

        let (width, height) = renderer.viewport(page, scale)?.bitmap_size(page, scale)?;
        let mut surface = Surface::new(width, height);
        renderer.render_into(page, scale, &mut surface).await?;

        let mut state = self.state.borrow_mut();
        state.stats.renders += 1;
        state.insert(page, surface, token);
        Ok(())
    }

    /// Copy the cached bitmap of `page` into `target`
    ///
    /// On a miss the target is hidden and `false` is returned; on a hit the
    /// target takes the bitmap's size and pixels and becomes visible.
    pub fn draw(&self, page: u32, target: &mut Surface) -> bool {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        match state.entries.get_mut(&page) {
            Some(entry) if !entry.surface.is_released() => {
                target.copy_from(&entry.surface);
                target.set_visible(true);
                entry.last_used = now;
                true
            }
            _ => {
                target.set_visible(false);
                false
            }
        }
    }

    /// Apply the eviction policy around `anchor`
    ///
    /// Returns the number of evicted pages.
    pub fn trim_to_window(&self, anchor: u32, total: u32) -> usize {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let victims = state.policy.select_victims(
            state.entries.iter().map(|(page, entry)| (*page, entry.last_used)),
            anchor,
            total,
        );
        for page in &victims {
            state.evict(*page);
        }
        if !victims.is_empty() {
            log::debug!("evicted pages {victims:?} around anchor {anchor}");
        }
        victims.len()
    }

    /// Release every bitmap and forget the current scale
    pub fn clear(&self) {
        self.state.borrow_mut().clear();
    }

    /// Pages of the window around `anchor` not cached at `scale`
    pub fn missing_in_window(&self, anchor: u32, total: u32, scale: f64) -> Vec<u32> {
        let state = self.state.borrow();
        let current = state.token == Some(ScaleToken::from_scale(scale));
        state
            .policy
            .window(anchor, total)
            .pages()
            .filter(|page| !current || !state.entries.contains_key(page))
            .collect()
    }

    /// Whether `page` is cached, without touching its last-used time
    pub fn contains(&self, page: u32) -> bool {
        self.state.borrow().entries.contains_key(&page)
    }

    /// Cached pages, ascending
    pub fn cached_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.state.borrow().entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Scale token the cached entries belong to
    pub fn scale_token(&self) -> Option<ScaleToken> {
        self.state.borrow().token
    }

    /// Scale token `page` was rendered under
    pub fn entry_token(&self, page: u32) -> Option<ScaleToken> {
        self.state.borrow().entries.get(&page).map(CacheEntry::token)
    }

    /// Last-used time of `page`
    pub fn last_used(&self, page: u32) -> Option<u64> {
        self.state.borrow().entries.get(&page).map(CacheEntry::last_used)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    /// Bytes held by cached bitmaps
    pub fn memory_used(&self) -> usize {
        self.state
            .borrow()
            .entries
            .values()
            .map(|entry| entry.surface.byte_len())
            .sum()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.state.borrow().policy
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.state.borrow().stats
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}
