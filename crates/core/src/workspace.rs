//! Single-document workspace
//!
//! Owns the layout provider, the recognition service and all state derived
//! from the selected document: the page pipeline, the search session and the
//! cache of rendered page layouts. Selecting a document advances the epoch,
//! so nothing from the previous selection stays searchable or highlightable.

use crate::config::PipelineConfig;
use crate::document::Document;
use crate::epoch::Epoch;
use crate::error::{CoreError, CoreResult};
use crate::highlight::{derive_highlights, LayoutCache};
use crate::pipeline::{PagePipeline, PipelineError, PipelineState, ProgressCallback};
use crate::search::{SearchResult, SearchSession};
use doc_model::{HighlightRect, LayoutProvider, Raster, RecognitionService, RecognizedPage};
use std::collections::BTreeMap;

pub struct Workspace<P, R> {
    provider: P,
    recognizer: R,
    epoch: Epoch,
    pipeline: PagePipeline,
    session: SearchSession,
    layouts: LayoutCache,
    progress: Option<ProgressCallback>,
}

impl<P, R> Workspace<P, R>
where
    P: LayoutProvider,
    R: RecognitionService,
{
    pub fn new(provider: P, recognizer: R, config: PipelineConfig) -> Self {
        Self {
            provider,
            recognizer,
            epoch: Epoch::new(),
            pipeline: PagePipeline::new(config),
            session: SearchSession::new(),
            layouts: LayoutCache::new(),
            progress: None,
        }
    }

    /// Report pipeline progress through `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn pipeline(&self) -> &PagePipeline {
        &self.pipeline
    }

    pub fn state(&self) -> &PipelineState {
        self.pipeline.state()
    }

    /// The current document; `None` once a newer selection has superseded it
    pub fn document(&self) -> Option<&Document> {
        if self.pipeline.is_superseded() {
            return None;
        }
        self.pipeline.document()
    }

    /// Pages recognized so far for the current document
    pub fn recognized_pages(&self) -> &[RecognizedPage] {
        self.document().map(Document::pages).unwrap_or(&[])
    }

    /// Replace the current document with a new one
    ///
    /// Search results, rendered layouts and recognized pages of the previous
    /// document are dropped before the new one is opened.
    pub fn select_document(&mut self, bytes: Vec<u8>) -> Result<&Document, PipelineError> {
        let ticket = self.epoch.advance();
        log::debug!("selecting document, generation {}", ticket.generation());

        if let Err(e) = self.pipeline.close(&mut self.provider) {
            log::warn!("failed to close previous document: {e}");
        }
        self.session.clear();
        self.layouts.clear();

        self.pipeline.open(&mut self.provider, bytes, ticket)
    }

    /// Recognize the next page
    pub fn step(&mut self) -> Result<PipelineState, PipelineError> {
        let outcome = self.pipeline.step(&self.provider, &self.recognizer, self.progress.as_ref());
        self.discard_if_superseded(&outcome);
        outcome
    }

    /// Recognize every remaining page
    pub fn process(&mut self) -> Result<(), PipelineError> {
        let outcome = self.pipeline.run(&self.provider, &self.recognizer, self.progress.as_ref());
        self.discard_if_superseded(&outcome);
        outcome
    }

    fn discard_if_superseded<T>(&mut self, outcome: &Result<T, PipelineError>) {
        if matches!(outcome, Err(PipelineError::Superseded)) {
            self.discard_stale();
        }
    }

    /// Drop search results and rendered layouts of a superseded document
    fn discard_stale(&mut self) {
        log::debug!("discarding {} cached layouts of a superseded document", self.layouts.len());
        self.session.clear();
        self.layouts.clear();
    }

    /// Search the pages recognized so far
    pub fn search(&mut self, query: &str) -> &SearchResult {
        if self.pipeline.is_superseded() {
            self.discard_stale();
            return self.session.search(query, &[]);
        }
        let pages = self.pipeline.document().map(Document::pages).unwrap_or(&[]);
        self.session.search(query, pages)
    }

    pub fn search_result(&self) -> &SearchResult {
        self.session.result()
    }

    pub fn clear_search(&mut self) {
        self.session.clear();
    }

    /// Render a page at the display scale
    ///
    /// The page layout is cached once the raster exists, which makes the page
    /// eligible for highlighting. A superseded document is never rendered.
    pub fn render_page(&mut self, page_number: u32) -> CoreResult<Raster> {
        if self.pipeline.is_superseded() {
            self.discard_stale();
            return Err(CoreError::Superseded);
        }
        let handle = self.pipeline.handle().ok_or(CoreError::NoDocument)?;
        let scale = self.pipeline.config().display_scale;

        let layout = self.provider.page_layout(handle, page_number, scale)?;
        let raster = self.provider.render_page(handle, &layout)?;
        self.layouts.insert(layout);

        log::debug!("page {page_number} rendered at scale {scale}");
        Ok(raster)
    }

    pub fn layouts(&self) -> &LayoutCache {
        &self.layouts
    }

    /// Highlights for every rendered page that matches the active query
    pub fn highlights(&self) -> BTreeMap<u32, Vec<HighlightRect>> {
        if self.pipeline.is_superseded() {
            return BTreeMap::new();
        }
        let Some(query) = self.session.active_query() else {
            return BTreeMap::new();
        };
        let matching = &self.session.result().matching_pages;

        let pages = self
            .layouts
            .pages()
            .filter(|page| matching.binary_search(page).is_ok())
            .filter_map(|page| self.layouts.get(page));
        derive_highlights(pages, query)
    }

    /// Highlights for one page
    ///
    /// The page must have been rendered. A page outside the current match
    /// set yields no rectangles.
    pub fn highlights_for(&self, page_number: u32) -> CoreResult<Vec<HighlightRect>> {
        if self.pipeline.is_superseded() {
            return Err(CoreError::Superseded);
        }
        if !self.layouts.contains(page_number) {
            return Err(CoreError::LayoutUnavailable { page: page_number });
        }

        match self.session.active_query() {
            Some(query)
                if self.session.result().matching_pages.binary_search(&page_number).is_ok() =>
            {
                self.layouts.highlights_for(page_number, query)
            }
            _ => Ok(Vec::new()),
        }
    }
}
