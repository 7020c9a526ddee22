//! Single-flight guard
//!
//! At most one run of an operation at a time. A caller that finds a run in
//! progress gets `None` and is expected to skip its work; the flag clears
//! when the winning caller's guard is dropped, including on early return.

use std::cell::Cell;
use std::rc::Rc;

/// Shared "operation in progress" flag
///
/// Clones share the same flag.
///
/// # Example
///
/// ```
/// use apostila_scheduler::SingleFlight;
///
/// let flight = SingleFlight::new();
///
/// let guard = flight.try_begin().expect("nothing running yet");
/// assert!(flight.try_begin().is_none());
///
/// drop(guard);
/// assert!(!flight.is_in_flight());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Rc<Cell<bool>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a run is already in progress
    pub fn try_begin(&self) -> Option<FlightGuard> {
        if self.busy.get() {
            return None;
        }
        self.busy.set(true);
        Some(FlightGuard {
            busy: Rc::clone(&self.busy),
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.busy.get()
    }
}

/// Proof of holding a [`SingleFlight`]; releases it on drop
#[must_use = "the flight ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FlightGuard {
    busy: Rc<Cell<bool>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}
