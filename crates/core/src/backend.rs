//! Backend endpoints consumed by the viewer
//!
//! The viewer talks to three JSON endpoints (document metadata, reading
//! progress, search) and downloads the PDF itself. Every JSON response uses
//! the same envelope: `{"ok": bool, "error": "...", <payload>}`.
//!
//! Response parsing lives in plain functions so it can be tested without a
//! server; [`HttpBackend`] only adds the transport.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use apostila_render::DocumentSource;
use serde::{Deserialize, Serialize};

use crate::config::{is_http_url, Endpoints};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("apostila-viewer/", env!("CARGO_PKG_VERSION"));

/// Errors talking to the backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    /// The body was not the JSON the endpoint promises
    #[error("invalid response from {endpoint} endpoint: {message}")]
    InvalidResponse {
        endpoint: &'static str,
        message: String,
    },

    /// Non-2xx status or `ok: false`
    #[error(
        "{endpoint} request rejected: {}",
        .message.as_deref().unwrap_or("no reason given")
    )]
    Rejected {
        endpoint: &'static str,
        message: Option<String>,
    },

    #[error("no {0} endpoint configured")]
    NotConfigured(&'static str),
}

impl BackendError {
    /// Server-provided reason, if the request was rejected with one
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Metadata of the active document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "titulo", default)]
    pub title: String,

    #[serde(rename = "total_paginas", default)]
    pub total_pages: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl DocumentMeta {
    /// Title line shown above the viewer
    pub fn heading(&self) -> String {
        format!("{} ({} paginas)", self.title, self.total_pages)
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "pagina")]
    pub page: u32,

    #[serde(rename = "trecho", default)]
    pub excerpt: String,
}

/// The backend as seen by the viewer
///
/// Implementations run on the viewer's thread; futures need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait ViewerBackend {
    /// Metadata of the active document
    async fn document_meta(&self) -> Result<DocumentMeta, BackendError>;

    /// Make the PDF at `url` available for opening
    ///
    /// `http(s)` URLs are downloaded; anything else is a local path.
    async fn fetch_pdf(&self, url: &str) -> Result<DocumentSource, BackendError>;

    /// Last page the reader reached, if the server knows one
    async fn load_progress(&self) -> Result<Option<u32>, BackendError>;

    /// Record `page` as the last page read
    ///
    /// Returns the page the server acknowledged.
    async fn save_progress(&self, page: u32) -> Result<Option<u32>, BackendError>;

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, BackendError>;

    fn has_progress_endpoint(&self) -> bool;

    fn has_search_endpoint(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Deserialize)]
struct DocumentPayload {
    #[serde(default)]
    documento: Option<DocumentMeta>,
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    progresso: Option<ProgressRecord>,
}

#[derive(Debug, Deserialize)]
struct ProgressRecord {
    #[serde(default)]
    ultima_pagina_lida: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    resultados: Option<serde_json::Value>,
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn decode<T>(endpoint: &'static str, status: u16, body: &str) -> Result<T, BackendError>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| BackendError::InvalidResponse {
            endpoint,
            message: e.to_string(),
        })?;
    if !is_success(status) || !envelope.ok {
        return Err(BackendError::Rejected {
            endpoint,
            message: envelope.error.filter(|m| !m.trim().is_empty()),
        });
    }
    Ok(envelope.payload)
}

/// Page number from a loosely typed JSON value
///
/// Numbers are truncated; strings contribute their leading integer
/// (`"12abc"` is 12). Negative pages become 1. Missing, zero and unreadable
/// values yield `None`.
pub fn page_from_value(value: Option<&serde_json::Value>) -> Option<u32> {
    let raw = match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        serde_json::Value::String(s) => leading_integer(s)?,
        _ => return None,
    };
    if raw == 0 {
        return None;
    }
    Some(raw.clamp(1, i64::from(u32::MAX)) as u32)
}

/// Leading integer of `text`, after optional whitespace and sign
pub(crate) fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Saturate absurdly long numbers instead of failing.
    let value = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * value)
}

/// Parse the document metadata response
pub fn parse_document_meta(status: u16, body: &str) -> Result<DocumentMeta, BackendError> {
    let payload: DocumentPayload = decode("document", status, body)?;
    let mut meta = payload.documento.ok_or(BackendError::Rejected {
        endpoint: "document",
        message: None,
    })?;
    meta.pdf_url = meta.pdf_url.filter(|url| !url.trim().is_empty());
    Ok(meta)
}

/// Parse the `GET` progress response
///
/// `Ok(None)` means the server has no record; a record without a readable
/// page points at page 1.
pub fn parse_progress(status: u16, body: &str) -> Result<Option<u32>, BackendError> {
    let payload: ProgressPayload = decode("progress", status, body)?;
    Ok(payload
        .progresso
        .map(|record| page_from_value(record.ultima_pagina_lida.as_ref()).unwrap_or(1)))
}

/// Parse the `POST` progress response for a save of `sent`
///
/// A record without a readable page acknowledges `sent`.
pub fn parse_saved_progress(
    status: u16,
    body: &str,
    sent: u32,
) -> Result<Option<u32>, BackendError> {
    let payload: ProgressPayload = decode("progress", status, body)?;
    Ok(payload
        .progresso
        .map(|record| page_from_value(record.ultima_pagina_lida.as_ref()).unwrap_or(sent)))
}

/// Parse the search response
///
/// A missing or non-array `resultados` is an empty result list; entries
/// that are not hits are skipped.
pub fn parse_search(status: u16, body: &str) -> Result<Vec<SearchHit>, BackendError> {
    let payload: SearchPayload = decode("search", status, body)?;
    let hits = match payload.resultados {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<SearchHit>(item).ok())
            .collect(),
        _ => Vec::new(),
    };
    Ok(hits)
}

/// [`ViewerBackend`] over HTTP
///
/// Requests use a blocking `ureq` agent on tokio's blocking pool so the
/// viewer's thread keeps running while they are in flight.
#[derive(Clone)]
pub struct HttpBackend {
    agent: ureq::Agent,
    endpoints: Endpoints,
    csrf_token: Option<String>,
}

struct RawResponse {
    status: u16,
    body: String,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints, csrf_token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            endpoints,
            csrf_token,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn endpoint(&self, url: Option<&String>, name: &'static str) -> Result<String, BackendError> {
        url.map(|u| self.endpoints.resolve(u))
            .ok_or(BackendError::NotConfigured(name))
    }

    async fn blocking<T, F>(&self, request: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T, BackendError> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || request(agent))
            .await
            .map_err(|e| BackendError::Network(format!("request task failed: {e}")))?
    }

    async fn send_json(
        &self,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse, BackendError> {
        let csrf_token = self.csrf_token.clone();
        self.blocking(move |agent| {
            let result = match body {
                Some(body) => {
                    let mut request = agent
                        .post(&url)
                        .set("Accept", "application/json")
                        .set("Content-Type", "application/json");
                    if let Some(token) = &csrf_token {
                        request = request.set("X-CSRFToken", token);
                    }
                    request.send_string(&body.to_string())
                }
                None => agent.get(&url).set("Accept", "application/json").call(),
            };
            read_text(result)
        })
        .await
    }
}

/// Body of a response, including error statuses
///
/// Rejections carry their reason in the JSON body, so a non-2xx status is
/// not a transport failure here.
fn read_text(result: Result<ureq::Response, ureq::Error>) -> Result<RawResponse, BackendError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(e)) => return Err(BackendError::Network(e.to_string())),
    };
    let status = response.status();
    let body = response
        .into_string()
        .map_err(|e| BackendError::Network(e.to_string()))?;
    Ok(RawResponse { status, body })
}

impl ViewerBackend for HttpBackend {
    async fn document_meta(&self) -> Result<DocumentMeta, BackendError> {
        let url = self.endpoint(self.endpoints.document_url.as_ref(), "document")?;
        log::debug!("GET {url}");
        let response = self.send_json(url, None).await?;
        parse_document_meta(response.status, &response.body)
    }

    async fn fetch_pdf(&self, url: &str) -> Result<DocumentSource, BackendError> {
        let url = self.endpoints.resolve(url);
        if !is_http_url(&url) {
            return Ok(DocumentSource::Path(PathBuf::from(url)));
        }

        log::debug!("downloading {url}");
        let bytes = self
            .blocking(move |agent| {
                let response = match agent.get(&url).call() {
                    Ok(response) => response,
                    Err(ureq::Error::Status(code, _)) => {
                        return Err(BackendError::Rejected {
                            endpoint: "pdf",
                            message: Some(format!("HTTP {code}")),
                        })
                    }
                    Err(ureq::Error::Transport(e)) => {
                        return Err(BackendError::Network(e.to_string()))
                    }
                };
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| BackendError::Network(e.to_string()))?;
                Ok(bytes)
            })
            .await?;
        log::debug!("downloaded {} bytes", bytes.len());
        Ok(DocumentSource::Bytes(bytes))
    }

    async fn load_progress(&self) -> Result<Option<u32>, BackendError> {
        let url = self.endpoint(self.endpoints.progress_url.as_ref(), "progress")?;
        let response = self.send_json(url, None).await?;
        parse_progress(response.status, &response.body)
    }

    async fn save_progress(&self, page: u32) -> Result<Option<u32>, BackendError> {
        let url = self.endpoint(self.endpoints.progress_url.as_ref(), "progress")?;
        log::debug!("saving progress: page {page}");
        let response = self
            .send_json(url, Some(serde_json::json!({ "pagina": page })))
            .await?;
        parse_saved_progress(response.status, &response.body, page)
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, BackendError> {
        let url = self.endpoint(self.endpoints.search_url.as_ref(), "search")?;
        let term = term.to_string();
        let response = self
            .blocking(move |agent| {
                read_text(
                    agent
                        .get(&url)
                        .set("Accept", "application/json")
                        .query("q", &term)
                        .call(),
                )
            })
            .await?;
        parse_search(response.status, &response.body)
    }

    fn has_progress_endpoint(&self) -> bool {
        self.endpoints.progress_url.is_some()
    }

    fn has_search_endpoint(&self) -> bool {
        self.endpoints.search_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_meta_is_parsed() {
        let body = r#"{"ok": true, "documento": {"titulo": "Apostila CNH", "total_paginas": 120, "pdf_url": "/media/apostila.pdf"}}"#;
        let meta = parse_document_meta(200, body).unwrap();

        assert_eq!(meta.title, "Apostila CNH");
        assert_eq!(meta.total_pages, 120);
        assert_eq!(meta.pdf_url.as_deref(), Some("/media/apostila.pdf"));
        assert_eq!(meta.heading(), "Apostila CNH (120 paginas)");
    }

    #[test]
    fn blank_pdf_url_counts_as_missing() {
        let body = r#"{"ok": true, "documento": {"titulo": "A", "total_paginas": 1, "pdf_url": ""}}"#;
        assert_eq!(parse_document_meta(200, body).unwrap().pdf_url, None);
    }

    #[test]
    fn rejection_carries_server_message() {
        let body = r#"{"ok": false, "error": "Nenhuma apostila ativa."}"#;
        let err = parse_document_meta(404, body).unwrap_err();
        assert_eq!(err.rejection_message(), Some("Nenhuma apostila ativa."));

        let err = parse_document_meta(200, r#"{"ok": true}"#).unwrap_err();
        assert!(matches!(err, BackendError::Rejected { message: None, .. }));
    }

    #[test]
    fn non_json_body_is_invalid() {
        let err = parse_search(500, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { endpoint: "search", .. }));
    }

    #[test]
    fn progress_page_accepts_numbers_and_strings() {
        let cases = [
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": 7}}"#, Some(7)),
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": "12"}}"#, Some(12)),
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": "12abc"}}"#, Some(12)),
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": 0}}"#, Some(1)),
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": -4}}"#, Some(1)),
            (r#"{"ok": true, "progresso": {}}"#, Some(1)),
            (r#"{"ok": true, "progresso": {"ultima_pagina_lida": "abc"}}"#, Some(1)),
            (r#"{"ok": true}"#, None),
        ];
        for (body, expected) in cases {
            assert_eq!(parse_progress(200, body).unwrap(), expected, "{body}");
        }
    }

    #[test]
    fn saved_progress_falls_back_to_sent_page() {
        let acknowledged = r#"{"ok": true, "progresso": {"ultima_pagina_lida": 9}}"#;
        assert_eq!(parse_saved_progress(200, acknowledged, 8).unwrap(), Some(9));

        let unreadable = r#"{"ok": true, "progresso": {"ultima_pagina_lida": "x"}}"#;
        assert_eq!(parse_saved_progress(200, unreadable, 8).unwrap(), Some(8));

        let missing = r#"{"ok": true, "progresso": {}}"#;
        assert_eq!(parse_saved_progress(200, missing, 8).unwrap(), Some(8));

        let zero = r#"{"ok": true, "progresso": {"ultima_pagina_lida": 0}}"#;
        assert_eq!(parse_saved_progress(200, zero, 8).unwrap(), Some(8));

        assert_eq!(parse_saved_progress(200, r#"{"ok": true}"#, 8).unwrap(), None);
        assert!(parse_saved_progress(403, r#"{"ok": false}"#, 8).is_err());
    }

    #[test]
    fn search_hits_are_parsed() {
        let body = json!({
            "ok": true,
            "resultados": [
                {"pagina": 3, "trecho": "faixa de pedestres"},
                {"pagina": "x"},
                {"pagina": 10, "trecho": "pedestre"}
            ]
        })
        .to_string();

        let hits = parse_search(200, &body).unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    page: 3,
                    excerpt: "faixa de pedestres".to_string()
                },
                SearchHit {
                    page: 10,
                    excerpt: "pedestre".to_string()
                },
            ]
        );
    }

    #[test]
    fn non_array_results_are_empty() {
        let body = r#"{"ok": true, "resultados": "nenhum"}"#;
        assert!(parse_search(200, body).unwrap().is_empty());
    }

    #[test]
    fn unconfigured_endpoints_are_reported() {
        let backend = HttpBackend::new(Endpoints::default(), None);
        assert!(!backend.has_progress_endpoint());
        assert!(!backend.has_search_endpoint());
        assert_eq!(
            backend.endpoint(None, "search"),
            Err(BackendError::NotConfigured("search"))
        );
    }

    #[tokio::test]
    async fn local_pdf_paths_are_not_downloaded() {
        let backend = HttpBackend::new(Endpoints::default(), None);
        let source = backend.fetch_pdf("docs/apostila.pdf").await.unwrap();
        assert_eq!(source, DocumentSource::Path(PathBuf::from("docs/apostila.pdf")));
    }
}
