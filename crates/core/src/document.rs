//! Recognized document state
//!
//! A [`Document`] is an explicit value: the page count fixed at open time and
//! the recognized pages accumulated so far. It never fetches anything itself;
//! the page pipeline pushes pages into it one at a time, in order.

use crate::error::{CoreError, CoreResult};
use doc_model::RecognizedPage;
use serde::{Deserialize, Serialize};

/// How far recognition got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Pages are still being recognized
    InProgress,

    /// Every page was recognized
    Complete,

    /// Recognition stopped at `failed_page`; earlier pages are kept
    Incomplete { failed_page: u32, reason: String },
}

/// Page count plus recognized text for one opened document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    total_pages: u32,
    pages: Vec<RecognizedPage>,
    status: DocumentStatus,
}

impl Document {
    /// Create an empty document with a fixed page count
    ///
    /// A document with no pages is complete from the start.
    pub fn new(total_pages: u32) -> Self {
        let status =
            if total_pages == 0 { DocumentStatus::Complete } else { DocumentStatus::InProgress };
        Self { total_pages, pages: Vec::new(), status }
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Recognized pages so far, in page order
    pub fn pages(&self) -> &[RecognizedPage] {
        &self.pages
    }

    pub fn recognized_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn status(&self) -> &DocumentStatus {
        &self.status
    }

    /// Whether every page has been recognized
    pub fn is_complete(&self) -> bool {
        self.status == DocumentStatus::Complete
    }

    /// The page that would be accepted next, if any
    pub fn next_page(&self) -> Option<u32> {
        let next = self.recognized_count() + 1;
        (self.status == DocumentStatus::InProgress && next <= self.total_pages).then_some(next)
    }

    /// Text of a recognized page
    pub fn page_text(&self, page_number: u32) -> Option<&str> {
        self.pages
            .iter()
            .find(|page| page.page_number == page_number)
            .map(|page| page.text.as_str())
    }

    /// Append the next recognized page
    ///
    /// Pages must arrive as 1, 2, 3, ... up to `total_pages`. Once the last
    /// page is in, the document is marked complete.
    pub fn push_page(&mut self, page: RecognizedPage) -> CoreResult<()> {
        let expected = self.recognized_count() + 1;
        if self.status != DocumentStatus::InProgress
            || page.page_number != expected
            || page.page_number > self.total_pages
        {
            return Err(CoreError::OutOfOrderPage { expected, got: page.page_number });
        }

        self.pages.push(page);
        if self.recognized_count() == self.total_pages {
            self.status = DocumentStatus::Complete;
        }
        Ok(())
    }

    /// Mark recognition as stopped at `failed_page`
    pub fn mark_incomplete(&mut self, failed_page: u32, reason: impl Into<String>) {
        self.status = DocumentStatus::Incomplete { failed_page, reason: reason.into() };
    }
}
