//! Search over recognized page text

use crate::match_locator::page_has_match;
use doc_model::RecognizedPage;
use serde::{Deserialize, Serialize};

/// Outcome of one search
///
/// An empty `query` with an empty `message` means the search was cleared,
/// which is distinct from a query that found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub matching_pages: Vec<u32>,
    pub message: String,
}

impl SearchResult {
    /// Whether this result came from a blank query
    pub fn is_cleared(&self) -> bool {
        self.query.is_empty()
    }

    pub fn has_matches(&self) -> bool {
        !self.matching_pages.is_empty()
    }
}

/// Search the recognized pages for `query`
///
/// Only pages present in `pages` are considered; pages not yet recognized
/// never appear in the result.
pub fn search(query: &str, pages: &[RecognizedPage]) -> SearchResult {
    let query = query.trim();
    if query.is_empty() {
        return SearchResult::default();
    }

    let mut matching_pages: Vec<u32> = pages
        .iter()
        .filter(|page| page_has_match(&page.text, query))
        .map(|page| page.page_number)
        .collect();
    matching_pages.sort_unstable();
    matching_pages.dedup();

    let message = if matching_pages.is_empty() {
        format!("\"{query}\" was not found in this document.")
    } else {
        let list: Vec<String> = matching_pages.iter().map(u32::to_string).collect();
        format!("Found \"{query}\" on pages: {}", list.join(", "))
    };

    log::debug!("search {query:?}: {} of {} pages match", matching_pages.len(), pages.len());

    SearchResult { query: query.to_owned(), matching_pages, message }
}

/// The active query and its result
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    result: SearchResult,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a search, replacing the previous result
    pub fn search(&mut self, query: &str, pages: &[RecognizedPage]) -> &SearchResult {
        self.result = search(query, pages);
        &self.result
    }

    pub fn result(&self) -> &SearchResult {
        &self.result
    }

    /// The active query, or `None` when cleared
    pub fn active_query(&self) -> Option<&str> {
        if self.result.is_cleared() {
            None
        } else {
            Some(self.result.query.as_str())
        }
    }

    pub fn clear(&mut self) {
        self.result = SearchResult::default();
    }
}
