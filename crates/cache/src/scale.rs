//! Scale tokens
//!
//! Render scales are real numbers derived from the host width and the zoom
//! factor, so two renders at "the same" scale rarely compare equal bit for
//! bit. A [`ScaleToken`] rounds the scale to three decimals and identifies
//! the cache epoch: only bitmaps rendered under the current token are kept.

use std::fmt;

/// Scale rounded to thousandths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScaleToken(i64);

impl ScaleToken {
    /// Token for `scale`, rounded half away from zero to three decimals
    pub fn from_scale(scale: f64) -> Self {
        Self((scale * 1000.0).round() as i64)
    }

    /// The rounded scale in thousandths
    pub fn thousandths(self) -> i64 {
        self.0
    }

    /// The rounded scale
    pub fn as_scale(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for ScaleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_scale())
    }
}
