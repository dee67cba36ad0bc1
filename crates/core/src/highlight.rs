//! Highlight derivation for rendered pages
//!
//! Highlights are never patched incrementally. Whenever the query, the match
//! set or the set of rendered pages changes, callers re-run
//! [`derive_highlights`] and replace whatever they drew before.

use crate::error::{CoreError, CoreResult};
use crate::fragment_index::FragmentIndex;
use crate::match_locator::{find_matches, overlapping_fragments};
use crate::projector::project;
use doc_model::{HighlightRect, PageLayout};
use std::collections::BTreeMap;

/// Highlight rectangles for one page
///
/// One rectangle per overlapping fragment per match. A fragment touched by
/// two matches yields two rectangles, and a fragment only partly covered by
/// a match is highlighted across its full width.
pub fn page_highlights(layout: &PageLayout, query: &str) -> Vec<HighlightRect> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let index = FragmentIndex::build(&layout.fragments);
    let mut rects = Vec::new();

    for span in find_matches(index.flat_text(), query) {
        for fragment in overlapping_fragments(span, index.offsets(), index.lengths()) {
            rects.push(project(&layout.fragments[fragment], &layout.viewport));
        }
    }

    rects
}

/// Highlights for every rendered page, keyed by page number
///
/// Pages without a match are left out of the map.
pub fn derive_highlights<'a, I>(pages: I, query: &str) -> BTreeMap<u32, Vec<HighlightRect>>
where
    I: IntoIterator<Item = &'a PageLayout>,
{
    pages
        .into_iter()
        .map(|layout| (layout.page_number, page_highlights(layout, query)))
        .filter(|(_, rects)| !rects.is_empty())
        .collect()
}

/// Layouts of pages whose render has completed
///
/// A layout enters the cache only after its page raster exists, which makes
/// this the gate between rendering and projection.
#[derive(Debug, Clone, Default)]
pub struct LayoutCache {
    layouts: BTreeMap<u32, PageLayout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rendered page, replacing any earlier layout for it
    pub fn insert(&mut self, layout: PageLayout) {
        self.layouts.insert(layout.page_number, layout);
    }

    pub fn get(&self, page_number: u32) -> Option<&PageLayout> {
        self.layouts.get(&page_number)
    }

    pub fn contains(&self, page_number: u32) -> bool {
        self.layouts.contains_key(&page_number)
    }

    /// Page numbers currently rendered, ascending
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.layouts.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Highlights for one page that must already be rendered
    pub fn highlights_for(&self, page_number: u32, query: &str) -> CoreResult<Vec<HighlightRect>> {
        let layout = self
            .layouts
            .get(&page_number)
            .ok_or(CoreError::LayoutUnavailable { page: page_number })?;
        Ok(page_highlights(layout, query))
    }

    /// Highlights across every rendered page
    pub fn derive(&self, query: &str) -> BTreeMap<u32, Vec<HighlightRect>> {
        derive_highlights(self.layouts.values(), query)
    }

    pub fn clear(&mut self) {
        self.layouts.clear();
    }
}
