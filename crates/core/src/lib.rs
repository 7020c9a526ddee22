//! Apostila Viewer Core Library
//!
//! Page viewer for the study-material reader: render scheduling, zoom and
//! navigation, background prefetch into the page cache, reading progress,
//! search and the backend client.
//!
//! The controller runs on a single thread. Drive it from a current-thread
//! tokio runtime inside a [`tokio::task::LocalSet`].

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod input;
pub mod prefetch;
pub mod progress;
pub mod search;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backend::{BackendError, DocumentMeta, HttpBackend, SearchHit, ViewerBackend};
pub use config::{ConfigError, Endpoints, LayoutConfig, ViewerConfig, ZoomLimits};
pub use controller::{CommandOutcome, HostPage, RenderPhase, RenderRequest, ViewerController};
pub use error::{ViewerError, ViewerResult};
pub use input::{ParseCommandError, Pinch, Swipe, ViewerCommand};
pub use prefetch::{prefetch_window, PrefetchCoordinator, PrefetchReport};
pub use progress::ProgressTracker;
pub use search::SearchOutcome;
pub use status::{ControlsState, SearchStatus, ViewerStatus};
