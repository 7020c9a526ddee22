//! Sliding-window eviction policy
//!
//! The cache keeps the page being read and its immediate neighbours warm.
//! After every mutation, entries outside the window around the anchor page
//! are dropped unconditionally; if the survivors still exceed the size cap,
//! the least recently used ones go next. The anchor's window is therefore
//! only ever evicted by the cap when the cap is smaller than the window.

use std::ops::RangeInclusive;

/// Pages kept on each side of the anchor page
pub const WINDOW_RADIUS: u32 = 1;

/// Maximum number of cached pages
pub const MAX_CACHED_PAGES: usize = 3;

/// The anchor page and its neighbours, clipped to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    first: u32,
    last: u32,
}

impl PageWindow {
    /// Window of [`WINDOW_RADIUS`] around `anchor` in a document of `total` pages
    pub fn around(anchor: u32, total: u32) -> Self {
        Self::with_radius(anchor, total, WINDOW_RADIUS)
    }

    /// Window of `radius` pages around `anchor`
    ///
    /// Empty when the document has no pages.
    pub fn with_radius(anchor: u32, total: u32, radius: u32) -> Self {
        Self {
            first: anchor.saturating_sub(radius).max(1),
            last: anchor.saturating_add(radius).min(total),
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        self.range().contains(&page)
    }

    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.last - self.first + 1) as usize
        }
    }

    /// Pages in the window, ascending
    pub fn pages(&self) -> RangeInclusive<u32> {
        self.range()
    }

    fn range(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }
}

/// Window radius plus size cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub radius: u32,
    pub max_entries: usize,
}

impl EvictionPolicy {
    /// The viewer's fixed policy: one page either side, at most three pages
    pub const STANDARD: Self = Self {
        radius: WINDOW_RADIUS,
        max_entries: MAX_CACHED_PAGES,
    };

    pub fn window(&self, anchor: u32, total: u32) -> PageWindow {
        PageWindow::with_radius(anchor, total, self.radius)
    }

    /// Pages to evict, given `(page, last_used)` for every cached entry
    ///
    /// Out-of-window pages come first (ascending page order), followed by
    /// in-window pages in least-recently-used order when the cap is still
    /// exceeded.
    pub fn select_victims<I>(&self, entries: I, anchor: u32, total: u32) -> Vec<u32>
    where
        I: IntoIterator<Item = (u32, u64)>,
    {
        let window = self.window(anchor, total);
        let (mut inside, outside): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|(page, _)| window.contains(*page));

        let mut victims: Vec<u32> = outside.into_iter().map(|(page, _)| page).collect();
        victims.sort_unstable();

        if inside.len() > self.max_entries {
            inside.sort_by_key(|&(page, last_used)| (last_used, page));
            let excess = inside.len() - self.max_entries;
            victims.extend(inside.into_iter().take(excess).map(|(page, _)| page));
        }

        victims
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}
