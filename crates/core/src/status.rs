//! User-facing status lines and control state
//!
//! The host page shows one status line for the viewer and one for search.
//! Messages are Portuguese, as on the reading page.

use std::fmt;

/// Viewer status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    FetchingMetadata,
    /// Metadata request failed; carries the server's reason when it gave one
    MetadataUnavailable(Option<String>),
    PdfUrlMissing,
    OpeningDocument,
    OpenFailed,
    Rendering(u32),
    /// `zoom_percent` is omitted on compact layouts
    PageShown {
        page: u32,
        total: u32,
        zoom_percent: Option<u32>,
    },
    RenderFailed,
    InvalidPageInput,
}

impl fmt::Display for ViewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchingMetadata => f.write_str("Buscando metadados do documento..."),
            Self::MetadataUnavailable(Some(reason)) => f.write_str(reason),
            Self::MetadataUnavailable(None) => {
                f.write_str("Nao foi possivel carregar o documento ativo.")
            }
            Self::PdfUrlMissing => f.write_str("URL do PDF ativo nao encontrada."),
            Self::OpeningDocument => f.write_str("Abrindo PDF..."),
            Self::OpenFailed => f.write_str("Erro inesperado ao abrir o documento."),
            Self::Rendering(page) => write!(f, "Renderizando pagina {page}..."),
            Self::PageShown {
                page,
                total,
                zoom_percent,
            } => {
                write!(f, "Pagina {page} de {total}")?;
                if let Some(zoom) = zoom_percent {
                    write!(f, " | Zoom {zoom}%")?;
                }
                Ok(())
            }
            Self::RenderFailed => f.write_str("Falha ao renderizar pagina."),
            Self::InvalidPageInput => f.write_str("Informe um numero de pagina valido."),
        }
    }
}

/// Search status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    EmptyTerm,
    Searching(String),
    Rejected(Option<String>),
    Failed,
    NoResults(String),
    Found { count: usize, term: String },
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTerm => f.write_str("Informe um termo para buscar."),
            Self::Searching(term) => write!(f, "Buscando por \"{term}\"..."),
            Self::Rejected(Some(reason)) => f.write_str(reason),
            Self::Rejected(None) => f.write_str("Falha na busca."),
            Self::Failed => f.write_str("Erro ao buscar no documento."),
            Self::NoResults(term) => write!(f, "Nenhum resultado para \"{term}\"."),
            Self::Found { count, term } => write!(
                f,
                "{count} resultado(s) para \"{term}\". Clique para ir para a pagina."
            ),
        }
    }
}

/// Snapshot of what the viewer's controls should show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlsState {
    pub has_document: bool,
    pub page: u32,
    pub total_pages: u32,
    pub render_in_progress: bool,
    pub zoom_percent: u32,
    /// Zoomed past fit-to-width; swipes are ignored
    pub zoom_active: bool,
    pub can_go_prev: bool,
    pub can_go_next: bool,
    /// Page input and zoom buttons accept input
    pub input_enabled: bool,
    pub search_enabled: bool,
    pub search_in_progress: bool,
}

/// Zoom factor as a whole percentage
pub fn zoom_percent(zoom: f64) -> u32 {
    (zoom * 100.0).round().max(0.0) as u32
}
