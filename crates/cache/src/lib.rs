//! Apostila Cache Library
//!
//! Scale-keyed render cache for the pages around the one being read, with
//! sliding-window plus LRU eviction.

pub mod page_cache;
pub mod policy;
pub mod scale;

pub use page_cache::{CacheEntry, CacheStats, PageCache};
pub use policy::{EvictionPolicy, PageWindow, MAX_CACHED_PAGES, WINDOW_RADIUS};
pub use scale::ScaleToken;
