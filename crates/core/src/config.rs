//! Viewer configuration
//!
//! Configuration can come from three places, applied in this order:
//! a TOML file, the JSON blob the host page embeds (endpoint URLs only),
//! and `APOSTILA_*` environment variables.
//!
//! ```toml
//! progress_save_delay_ms = 2000
//!
//! [endpoints]
//! document_url = "/apostila/api/documento-ativo/"
//! progress_url = "/apostila/api/progresso/"
//! search_url = "/apostila/api/busca/"
//!
//! [zoom]
//! min = 0.5
//! max = 3.0
//! step = 0.1
//!
//! [layout]
//! viewer_width = 800.0
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backend endpoint URLs
///
/// The aliases accept the key names used by the host page's embedded
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Origin that relative endpoint URLs are resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Active document metadata (`GET -> {ok, documento}`)
    #[serde(alias = "api_documento_ativo_url", skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,

    /// Fallback PDF URL when the metadata has none
    #[serde(alias = "api_documento_ativo_pdf_url", skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    /// Reading progress (`GET`/`POST -> {ok, progresso}`)
    #[serde(alias = "api_progresso_url", skip_serializing_if = "Option::is_none")]
    pub progress_url: Option<String>,

    /// Full-text search (`GET ?q= -> {ok, resultados}`)
    #[serde(alias = "api_busca_url", skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
}

impl Endpoints {
    /// Resolve `url` against [`Endpoints::base_url`]
    ///
    /// Absolute `http(s)` URLs and URLs without a base are returned as-is.
    pub fn resolve(&self, url: &str) -> String {
        if is_http_url(url) {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }

    /// Treat blank URLs as missing
    fn normalized(self) -> Self {
        fn keep(url: Option<String>) -> Option<String> {
            url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
        }
        Self {
            base_url: keep(self.base_url),
            document_url: keep(self.document_url),
            pdf_url: keep(self.pdf_url),
            progress_url: keep(self.progress_url),
            search_url: keep(self.search_url),
        }
    }
}

/// Whether `url` names an `http`/`https` resource
pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Zoom factor bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    /// Increment used by zoom in/out
    pub step: f64,
    /// Zoom factors above this count as "zoomed in"
    pub active_threshold: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 3.0,
            step: 0.1,
            active_threshold: 1.01,
        }
    }
}

impl ZoomLimits {
    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return 1.0_f64.clamp(self.min, self.max);
        }
        zoom.clamp(self.min, self.max)
    }
}

/// Fit-to-width layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Viewer width in pixels when the host does not report one
    pub viewer_width: f64,
    /// Horizontal space reserved around the page
    pub gutter: f64,
    /// Lower bound for the width a page is fitted to
    pub min_render_width: f64,
    /// Leave the zoom out of page status lines (small screens)
    pub compact_status: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            viewer_width: 800.0,
            gutter: 30.0,
            min_render_width: 100.0,
            compact_status: false,
        }
    }
}

impl LayoutConfig {
    /// Width a page is fitted to inside a viewer `viewer_width` pixels wide
    pub fn available_width(&self, viewer_width: f64) -> f64 {
        (viewer_width - self.gutter).max(self.min_render_width)
    }
}

/// Configuration for the page viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Quiet time after the last render before progress is saved
    pub progress_save_delay_ms: u64,

    /// Value of the `X-CSRFToken` header sent with progress updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    pub endpoints: Endpoints,
    pub zoom: ZoomLimits,
    pub layout: LayoutConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            progress_save_delay_ms: 2000,
            csrf_token: None,
            endpoints: Endpoints::default(),
            zoom: ZoomLimits::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Returns the default configuration file location.
    ///
    /// - macOS: ~/Library/Application Support/apostila/viewer.toml
    /// - Linux: ~/.config/apostila/viewer.toml
    /// - Windows: %APPDATA%\apostila\viewer.toml
    pub fn default_config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("apostila").join("viewer.toml"),
            None => PathBuf::from("apostila-viewer.toml"),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.endpoints = config.endpoints.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Parses the host page's embedded JSON configuration.
    ///
    /// Only the endpoint keys are read; everything else keeps its default.
    pub fn from_page_json(json: &str) -> Result<Self, ConfigError> {
        let endpoints: Endpoints = serde_json::from_str(json)?;
        Ok(Self {
            endpoints: endpoints.normalized(),
            ..Self::default()
        })
    }

    /// Loads `path` (or the default location if it exists), then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.is_file() {
                    log::debug!("loading viewer config from {}", default_path.display());
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.with_env_overrides()
    }

    /// Loads configuration from environment variables on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    ///
    /// Environment variables:
    /// - `APOSTILA_BASE_URL`: origin for relative endpoint URLs
    /// - `APOSTILA_DOCUMENT_URL`, `APOSTILA_PDF_URL`, `APOSTILA_PROGRESS_URL`,
    ///   `APOSTILA_SEARCH_URL`: endpoint URLs
    /// - `APOSTILA_CSRF_TOKEN`: CSRF header value
    /// - `APOSTILA_VIEWER_WIDTH`: viewer width in pixels
    /// - `APOSTILA_SAVE_DELAY_MS`: progress save delay
    ///
    /// # Errors
    /// Returns an error if any numeric variable contains an invalid value.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        let url = |name: &str| std::env::var(name).ok();

        if let Some(value) = url("APOSTILA_BASE_URL") {
            self.endpoints.base_url = Some(value);
        }
        if let Some(value) = url("APOSTILA_DOCUMENT_URL") {
            self.endpoints.document_url = Some(value);
        }
        if let Some(value) = url("APOSTILA_PDF_URL") {
            self.endpoints.pdf_url = Some(value);
        }
        if let Some(value) = url("APOSTILA_PROGRESS_URL") {
            self.endpoints.progress_url = Some(value);
        }
        if let Some(value) = url("APOSTILA_SEARCH_URL") {
            self.endpoints.search_url = Some(value);
        }
        if let Some(value) = url("APOSTILA_CSRF_TOKEN") {
            self.csrf_token = Some(value);
        }
        if let Ok(value) = std::env::var("APOSTILA_VIEWER_WIDTH") {
            self.layout.viewer_width = value
                .trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::invalid("APOSTILA_VIEWER_WIDTH", &value))?;
        }
        if let Ok(value) = std::env::var("APOSTILA_SAVE_DELAY_MS") {
            self.progress_save_delay_ms = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::invalid("APOSTILA_SAVE_DELAY_MS", &value))?;
        }

        self.endpoints = self.endpoints.normalized();
        self.validate()?;
        Ok(self)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn progress_save_delay(&self) -> Duration {
        Duration::from_millis(self.progress_save_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let zoom = &self.zoom;
        if !(zoom.min > 0.0) || !(zoom.max >= zoom.min) || !zoom.max.is_finite() {
            return Err(ConfigError::invalid(
                "zoom",
                &format!("min={} max={}", zoom.min, zoom.max),
            ));
        }
        if !(zoom.step > 0.0) || !zoom.step.is_finite() {
            return Err(ConfigError::invalid("zoom.step", &zoom.step.to_string()));
        }
        if !(self.layout.viewer_width > 0.0) || !self.layout.viewer_width.is_finite() {
            return Err(ConfigError::invalid(
                "layout.viewer_width",
                &self.layout.viewer_width.to_string(),
            ));
        }
        if !(self.layout.min_render_width > 0.0) || !self.layout.min_render_width.is_finite() {
            return Err(ConfigError::invalid(
                "layout.min_render_width",
                &self.layout.min_render_width.to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to write TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("invalid page configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
