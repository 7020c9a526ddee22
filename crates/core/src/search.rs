//! Full-text search through the backend

use crate::backend::{BackendError, SearchHit, ViewerBackend};
use crate::status::SearchStatus;

/// Result of a search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// No search endpoint, or no document open
    Unavailable,
    /// The term was blank after trimming
    EmptyTerm,
    /// Another search is still running
    Busy,
    Hits { term: String, hits: Vec<SearchHit> },
    /// The server refused the search, with its reason if it gave one
    Rejected(Option<String>),
    /// Network or protocol failure
    Failed,
}

impl SearchOutcome {
    /// Status line for this outcome, if it changes the search status
    pub fn status(&self) -> Option<SearchStatus> {
        match self {
            Self::Unavailable | Self::Busy => None,
            Self::EmptyTerm => Some(SearchStatus::EmptyTerm),
            Self::Hits { term, hits } if hits.is_empty() => {
                Some(SearchStatus::NoResults(term.clone()))
            }
            Self::Hits { term, hits } => Some(SearchStatus::Found {
                count: hits.len(),
                term: term.clone(),
            }),
            Self::Rejected(reason) => Some(SearchStatus::Rejected(reason.clone())),
            Self::Failed => Some(SearchStatus::Failed),
        }
    }

    /// Hits to list; empty for every outcome but a successful search
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Hits { hits, .. } => hits,
            _ => &[],
        }
    }
}

/// Normalize what the reader typed into a search term
pub fn normalize_term(raw: &str) -> Option<&str> {
    let term = raw.trim();
    (!term.is_empty()).then_some(term)
}

/// Search for an already normalized `term`
pub async fn run_search<B>(backend: &B, term: &str) -> SearchOutcome
where
    B: ViewerBackend + ?Sized,
{
    match backend.search(term).await {
        Ok(hits) => {
            log::debug!("search for {term:?}: {} hits", hits.len());
            SearchOutcome::Hits {
                term: term.to_string(),
                hits,
            }
        }
        Err(BackendError::Rejected { message, .. }) => SearchOutcome::Rejected(message),
        Err(e) => {
            log::error!("search for {term:?} failed: {e}");
            SearchOutcome::Failed
        }
    }
}
