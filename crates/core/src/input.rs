//! Input mapping
//!
//! Turns keys, swipes, pinches and script tokens into [`ViewerCommand`]s.

use std::fmt;
use std::str::FromStr;

use crate::config::ZoomLimits;

/// Something the reader asked the viewer to do
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Next,
    Prev,
    /// Go to a page typed by the reader (parsed by the controller)
    GoTo(String),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    /// The viewer area is now this many pixels wide
    Resize(f64),
    Search(String),
}

impl ViewerCommand {
    /// Keyboard shortcut, using DOM `KeyboardEvent.key` names
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowRight" | "PageDown" => Some(Self::Next),
            "ArrowLeft" | "PageUp" => Some(Self::Prev),
            "+" | "=" => Some(Self::ZoomIn),
            "-" | "_" => Some(Self::ZoomOut),
            "0" => Some(Self::ResetZoom),
            _ => None,
        }
    }
}

/// Error parsing a script token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown viewer command: {0:?}")]
pub struct ParseCommandError(String);

/// Parses tokens like `next`, `prev`, `goto:12`, `zoom-in`, `zoom-out`,
/// `reset-zoom`, `resize:640`, `search:placa`, `key:ArrowRight` and bare
/// page numbers.
impl FromStr for ViewerCommand {
    type Err = ParseCommandError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let (name, arg) = match token.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (token, None),
        };

        let command = match (name.to_ascii_lowercase().as_str(), arg) {
            ("next" | "n", None) => Self::Next,
            ("prev" | "p", None) => Self::Prev,
            ("goto" | "g", Some(page)) => Self::GoTo(page.to_string()),
            ("zoom-in" | "+", None) => Self::ZoomIn,
            ("zoom-out" | "-", None) => Self::ZoomOut,
            ("reset-zoom" | "0", None) => Self::ResetZoom,
            ("resize", Some(width)) => match width.trim().parse::<f64>() {
                Ok(width) if width.is_finite() && width > 0.0 => Self::Resize(width),
                _ => return Err(ParseCommandError(token.to_string())),
            },
            ("search" | "s", Some(term)) => Self::Search(term.to_string()),
            ("key", Some(key)) => {
                Self::from_key(key).ok_or_else(|| ParseCommandError(token.to_string()))?
            }
            (page, None) if !page.is_empty() && page.chars().all(|c| c.is_ascii_digit()) => {
                Self::GoTo(page.to_string())
            }
            _ => return Err(ParseCommandError(token.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for ViewerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str("next"),
            Self::Prev => f.write_str("prev"),
            Self::GoTo(page) => write!(f, "goto:{page}"),
            Self::ZoomIn => f.write_str("zoom-in"),
            Self::ZoomOut => f.write_str("zoom-out"),
            Self::ResetZoom => f.write_str("reset-zoom"),
            Self::Resize(width) => write!(f, "resize:{width}"),
            Self::Search(term) => write!(f, "search:{term}"),
        }
    }
}

/// Horizontal swipe recognizer
pub struct Swipe;

impl Swipe {
    /// Longest gesture that still counts as a swipe
    pub const MAX_DURATION_MS: u64 = 500;
    /// Minimum horizontal travel
    pub const MIN_DISTANCE_X: f64 = 70.0;
    /// Maximum vertical drift
    pub const MAX_DRIFT_Y: f64 = 60.0;

    /// Classify a finished touch gesture
    ///
    /// `dx`/`dy` are end minus start. Swiping left goes to the next page.
    /// Swipes are ignored while zoomed in, where dragging pans the page.
    pub fn classify(
        dx: f64,
        dy: f64,
        duration_ms: u64,
        zoom_active: bool,
    ) -> Option<ViewerCommand> {
        if zoom_active || duration_ms > Self::MAX_DURATION_MS {
            return None;
        }
        if dx.abs() < Self::MIN_DISTANCE_X || dy.abs() > Self::MAX_DRIFT_Y {
            return None;
        }
        if dx < 0.0 {
            Some(ViewerCommand::Next)
        } else {
            Some(ViewerCommand::Prev)
        }
    }
}

/// Two-finger pinch in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    start_distance: f64,
    start_zoom: f64,
    pending_zoom: f64,
}

impl Pinch {
    /// Smallest zoom change a pinch must produce to be applied
    pub const MIN_ZOOM_CHANGE: f64 = 0.02;

    pub fn start(distance: f64, zoom: f64) -> Self {
        Self {
            start_distance: distance,
            start_zoom: zoom,
            pending_zoom: zoom,
        }
    }

    /// Track the fingers moving to `distance`; returns the previewed zoom
    pub fn update(&mut self, distance: f64, limits: &ZoomLimits) -> f64 {
        let ratio = distance / self.start_distance.max(1.0);
        self.pending_zoom = limits.clamp(self.start_zoom * ratio);
        self.pending_zoom
    }

    pub fn pending_zoom(&self) -> f64 {
        self.pending_zoom
    }

    /// Zoom to apply when the pinch ends, if it moved enough
    pub fn finish(self, current_zoom: f64) -> Option<f64> {
        ((self.pending_zoom - current_zoom).abs() >= Self::MIN_ZOOM_CHANGE)
            .then_some(self.pending_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(ViewerCommand::from_key("ArrowRight"), Some(ViewerCommand::Next));
        assert_eq!(ViewerCommand::from_key("PageUp"), Some(ViewerCommand::Prev));
        assert_eq!(ViewerCommand::from_key("="), Some(ViewerCommand::ZoomIn));
        assert_eq!(ViewerCommand::from_key("_"), Some(ViewerCommand::ZoomOut));
        assert_eq!(ViewerCommand::from_key("0"), Some(ViewerCommand::ResetZoom));
        assert_eq!(ViewerCommand::from_key("Enter"), None);
    }

    #[test]
    fn script_tokens_parse() {
        let parsed: Vec<ViewerCommand> = [
            "next",
            "goto:12",
            "7",
            "zoom-in",
            "resize:640",
            "search:placa de pare",
        ]
        .iter()
        .map(|t| t.parse().unwrap())
        .collect();
        assert_eq!(
            parsed,
            vec![
                ViewerCommand::Next,
                ViewerCommand::GoTo("12".into()),
                ViewerCommand::GoTo("7".into()),
                ViewerCommand::ZoomIn,
                ViewerCommand::Resize(640.0),
                ViewerCommand::Search("placa de pare".into()),
            ]
        );
        assert!("fly".parse::<ViewerCommand>().is_err());
        assert!("resize:wide".parse::<ViewerCommand>().is_err());
    }

    #[test]
    fn key_tokens_use_the_shortcuts() {
        assert_eq!("key:PageDown".parse::<ViewerCommand>().unwrap(), ViewerCommand::Next);
        assert_eq!("key:=".parse::<ViewerCommand>().unwrap(), ViewerCommand::ZoomIn);
        assert!("key:Enter".parse::<ViewerCommand>().is_err());
    }

    #[test]
    fn resize_needs_a_positive_finite_width() {
        for token in ["resize:inf", "resize:-inf", "resize:NaN", "resize:0", "resize:-40"] {
            assert!(token.parse::<ViewerCommand>().is_err(), "{token} should be rejected");
        }
        assert_eq!(
            "resize:1e4".parse::<ViewerCommand>().unwrap(),
            ViewerCommand::Resize(10_000.0)
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        let command = ViewerCommand::Search("sinal".into());
        assert_eq!(command.to_string().parse::<ViewerCommand>().unwrap(), command);
    }

    #[test]
    fn swipe_thresholds() {
        assert_eq!(Swipe::classify(-120.0, 10.0, 200, false), Some(ViewerCommand::Next));
        assert_eq!(Swipe::classify(120.0, -10.0, 200, false), Some(ViewerCommand::Prev));
        assert_eq!(Swipe::classify(-69.0, 0.0, 200, false), None);
        assert_eq!(Swipe::classify(-120.0, 61.0, 200, false), None);
        assert_eq!(Swipe::classify(-120.0, 0.0, 501, false), None);
        assert_eq!(Swipe::classify(-120.0, 0.0, 200, true), None);
    }

    #[test]
    fn pinch_scales_and_clamps() {
        let limits = ZoomLimits::default();
        let mut pinch = Pinch::start(100.0, 1.0);

        assert_eq!(pinch.update(150.0, &limits), 1.5);
        assert_eq!(pinch.update(1000.0, &limits), 3.0);
        assert_eq!(pinch.finish(1.0), Some(3.0));
    }

    #[test]
    fn tiny_pinch_is_ignored() {
        let limits = ZoomLimits::default();
        let mut pinch = Pinch::start(200.0, 1.0);
        pinch.update(202.0, &limits);
        assert_eq!(pinch.finish(1.0), None);
    }
}
