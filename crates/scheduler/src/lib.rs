//! Apostila Scheduler Library
//!
//! Coordination primitives for the viewer's single-threaded event loop:
//! a single-flight guard, a latest-wins pending slot and a debounced
//! (cancel-and-replace) deferred task.
//!
//! # Example
//!
//! ```
//! use apostila_scheduler::{PendingSlot, SingleFlight};
//!
//! let rendering = SingleFlight::new();
//! let queued = PendingSlot::new();
//!
//! let _guard = rendering.try_begin().unwrap();
//!
//! // Requests arriving mid-render only keep the latest target.
//! for page in [5, 6, 9] {
//!     if rendering.is_in_flight() {
//!         queued.offer(page);
//!     }
//! }
//! assert_eq!(queued.take(), Some(9));
//! ```

mod debounce;
mod pending;
mod single_flight;

pub use debounce::DebouncedTask;
pub use pending::PendingSlot;
pub use single_flight::{FlightGuard, SingleFlight};
