//! Sequential page pipeline
//!
//! Drives one document through layout, rasterization and recognition, one
//! page at a time. The pipeline is an explicit state machine:
//!
//! ```text
//! Idle -> Opening -> ProcessingPage(1) -> ... -> ProcessingPage(n) -> Complete
//!            |               |
//!            +---------------+--> Failed
//! ```
//!
//! Each call to [`PagePipeline::step`] processes exactly one page. The first
//! failure stops the pipeline for good: pages recognized before it are kept,
//! no later page is attempted, and the document is marked incomplete.

use crate::config::PipelineConfig;
use crate::document::Document;
use crate::epoch::EpochTicket;
use doc_model::{
    DocumentHandle, LayoutError, LayoutProvider, RecognitionError, RecognitionService,
    RecognizedPage,
};
use std::sync::Arc;

/// Pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    /// Page `n` (1-based) is next to be recognized
    ProcessingPage(u32),
    Complete,
    /// Stopped on an error; holds the user-facing message
    Failed(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed(_))
    }
}

/// Progress report, sent before each page's recognition call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub page: u32,
    pub total_pages: u32,
}

impl Progress {
    /// Fraction of pages started, in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        if self.total_pages == 0 {
            return 1.0;
        }
        self.page as f32 / self.total_pages as f32
    }

    pub fn message(&self) -> String {
        format!("Processing page {} of {}", self.page, self.total_pages)
    }
}

/// Callback for progress updates
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Errors that stop the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("could not open document: {0}")]
    DocumentOpen(LayoutError),

    #[error("could not prepare page {page}: {cause}")]
    PageLayout { page: u32, cause: LayoutError },

    #[error("recognition failed on page {page}: {cause}")]
    PageRecognition { page: u32, cause: RecognitionError },

    #[error("document was replaced by a newer selection")]
    Superseded,

    #[error("no document has been opened")]
    NotOpened,

    #[error("pipeline stopped: {0}")]
    Halted(String),

    #[error("internal pipeline error: {0}")]
    Internal(String),
}

/// Page pipeline for one document at a time
#[derive(Debug)]
pub struct PagePipeline {
    config: PipelineConfig,
    state: PipelineState,
    handle: Option<DocumentHandle>,
    /// Handle of a dropped document, closed on the next `open` or `close`
    retired: Option<DocumentHandle>,
    document: Option<Document>,
    ticket: Option<EpochTicket>,
    progress: Option<Progress>,
}

impl PagePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            handle: None,
            retired: None,
            document: None,
            ticket: None,
            progress: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn handle(&self) -> Option<DocumentHandle> {
        self.handle
    }

    pub fn ticket(&self) -> Option<&EpochTicket> {
        self.ticket.as_ref()
    }

    /// Whether a newer document selection has superseded this one
    pub fn is_superseded(&self) -> bool {
        self.ticket.as_ref().is_some_and(EpochTicket::is_superseded)
    }

    /// Most recent progress report; `None` when idle or finished
    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    /// Open a document and prepare to process its first page
    ///
    /// Anything left over from a previous document is discarded and its
    /// provider handle closed first. On failure the pipeline ends in `Failed`
    /// with no document.
    pub fn open<P>(
        &mut self,
        provider: &mut P,
        bytes: Vec<u8>,
        ticket: EpochTicket,
    ) -> Result<&Document, PipelineError>
    where
        P: LayoutProvider + ?Sized,
    {
        if let Err(e) = self.release(provider) {
            log::warn!("failed to close previous document: {e}");
        }
        self.state = PipelineState::Opening;

        let opened = match provider.open_document(bytes) {
            Ok(opened) => opened,
            Err(e) => {
                let err = PipelineError::DocumentOpen(e);
                log::warn!("{err}");
                self.state = PipelineState::Failed(err.to_string());
                return Err(err);
            }
        };

        log::info!("document opened with {} pages", opened.total_pages);
        self.handle = Some(opened.handle);
        self.ticket = Some(ticket);
        self.state = if opened.total_pages == 0 {
            PipelineState::Complete
        } else {
            PipelineState::ProcessingPage(1)
        };

        Ok(self.document.insert(Document::new(opened.total_pages)))
    }

    /// Process one page and advance
    ///
    /// Returns the new state. Stepping a finished pipeline returns its state
    /// unchanged.
    pub fn step<P, R>(
        &mut self,
        provider: &P,
        recognizer: &R,
        progress: Option<&ProgressCallback>,
    ) -> Result<PipelineState, PipelineError>
    where
        P: LayoutProvider + ?Sized,
        R: RecognitionService + ?Sized,
    {
        let page = match self.state {
            PipelineState::ProcessingPage(page) => page,
            PipelineState::Complete | PipelineState::Failed(_) => return Ok(self.state.clone()),
            PipelineState::Idle | PipelineState::Opening => return Err(PipelineError::NotOpened),
        };

        self.ensure_current(page)?;

        let (handle, total_pages) = match (self.handle, self.document.as_ref()) {
            (Some(handle), Some(document)) => (handle, document.total_pages()),
            _ => return Err(PipelineError::NotOpened),
        };

        log::debug!("page {page}/{total_pages}: layout at scale {}", self.config.recognition_scale);
        let raster = match provider
            .page_layout(handle, page, self.config.recognition_scale)
            .and_then(|layout| provider.render_page(handle, &layout))
        {
            Ok(raster) => raster,
            Err(cause) => return Err(self.fail(page, PipelineError::PageLayout { page, cause })),
        };

        let report = Progress { page, total_pages };
        self.progress = Some(report);
        if let Some(callback) = progress {
            callback(report);
        }

        let text = match recognizer.recognize(&raster, self.config.language.as_deref()) {
            Ok(text) => text,
            Err(cause) => {
                return Err(self.fail(page, PipelineError::PageRecognition { page, cause }))
            }
        };

        // a newer document may have been selected while recognition ran
        self.ensure_current(page)?;

        log::debug!("page {page}/{total_pages}: {} chars recognized", text.chars().count());
        let pushed = self
            .document
            .as_mut()
            .map(|document| document.push_page(RecognizedPage::new(page, text)));
        match pushed {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                return Err(self.fail(page, PipelineError::Internal(e.to_string())));
            }
            None => return Err(PipelineError::NotOpened),
        }

        self.state = if page >= total_pages {
            log::info!("all {total_pages} pages recognized");
            self.progress = None;
            PipelineState::Complete
        } else {
            PipelineState::ProcessingPage(page + 1)
        };

        Ok(self.state.clone())
    }

    /// Step until the pipeline finishes
    pub fn run<P, R>(
        &mut self,
        provider: &P,
        recognizer: &R,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), PipelineError>
    where
        P: LayoutProvider + ?Sized,
        R: RecognitionService + ?Sized,
    {
        loop {
            match self.step(provider, recognizer, progress)? {
                PipelineState::Complete => return Ok(()),
                PipelineState::Failed(message) => return Err(PipelineError::Halted(message)),
                _ => {}
            }
        }
    }

    /// Close the open document in the provider and return to `Idle`
    pub fn close<P>(&mut self, provider: &mut P) -> Result<(), LayoutError>
    where
        P: LayoutProvider + ?Sized,
    {
        self.release(provider)
    }

    /// Take the document out, leaving the pipeline idle
    ///
    /// The provider handle stays held until the next `open` or `close`.
    pub fn take_document(&mut self) -> Option<Document> {
        let document = self.document.take();
        self.reset();
        document
    }

    fn release<P>(&mut self, provider: &mut P) -> Result<(), LayoutError>
    where
        P: LayoutProvider + ?Sized,
    {
        self.reset();
        match self.retired.take() {
            Some(handle) => provider.close_document(handle),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.retire_handle();
        self.state = PipelineState::Idle;
        self.document = None;
        self.ticket = None;
        self.progress = None;
    }

    fn retire_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.retired = Some(handle);
        }
    }

    fn ensure_current(&mut self, page: u32) -> Result<(), PipelineError> {
        if !self.is_superseded() {
            return Ok(());
        }

        log::warn!("page {page}: document superseded, dropping pipeline state");
        self.retire_handle();
        self.document = None;
        self.progress = None;
        self.state = PipelineState::Failed(PipelineError::Superseded.to_string());
        Err(PipelineError::Superseded)
    }

    fn fail(&mut self, page: u32, err: PipelineError) -> PipelineError {
        log::warn!("pipeline stopped at page {page}: {err}");
        let message = err.to_string();
        if let Some(document) = self.document.as_mut() {
            document.mark_incomplete(page, message.clone());
        }
        self.state = PipelineState::Failed(message);
        self.progress = None;
        err
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::DocumentStatus;
    use crate::epoch::Epoch;
    use doc_model::{Affine, OpenedDocument, PageLayout, Raster, TextFragment, Viewport};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Layout provider over scripted page texts
    ///
    /// Each page holds one fragment with the page text. Rasters are
    /// `page_number` pixels wide so a recognizer can tell pages apart.
    #[derive(Default)]
    pub(crate) struct ScriptedProvider {
        next_handle: u64,
        pub docs: HashMap<DocumentHandle, Vec<String>>,
        pub layout_calls: RefCell<Vec<(u32, f32)>>,
        pub fail_layout_on: Option<u32>,
    }

    impl ScriptedProvider {
        /// Bytes are the page texts joined by form feeds; `"\u{0}"` is
        /// rejected as an invalid document.
        pub fn encode(pages: &[&str]) -> Vec<u8> {
            pages.join("\u{c}").into_bytes()
        }
    }

    impl LayoutProvider for ScriptedProvider {
        fn open_document(&mut self, bytes: Vec<u8>) -> Result<OpenedDocument, LayoutError> {
            let text = String::from_utf8(bytes)
                .map_err(|e| LayoutError::InvalidDocument(e.to_string()))?;
            if text.contains('\u{0}') {
                return Err(LayoutError::InvalidDocument("corrupt".to_owned()));
            }
            let pages: Vec<String> = if text.is_empty() {
                Vec::new()
            } else {
                text.split('\u{c}').map(str::to_owned).collect()
            };

            self.next_handle += 1;
            let handle = DocumentHandle(self.next_handle);
            let total_pages = pages.len() as u32;
            self.docs.insert(handle, pages);
            Ok(OpenedDocument { handle, total_pages })
        }

        fn page_layout(
            &self,
            handle: DocumentHandle,
            page_number: u32,
            scale: f32,
        ) -> Result<PageLayout, LayoutError> {
            self.layout_calls.borrow_mut().push((page_number, scale));
            if self.fail_layout_on == Some(page_number) {
                return Err(LayoutError::Render("scripted failure".to_owned()));
            }

            let pages = self.docs.get(&handle).ok_or(LayoutError::InvalidHandle(handle.raw()))?;
            let text = pages.get(page_number as usize - 1).ok_or(
                LayoutError::PageOutOfRange { page: page_number, page_count: pages.len() as u32 },
            )?;

            Ok(PageLayout {
                page_number,
                fragments: vec![TextFragment::new(
                    text.clone(),
                    Affine::new(10.0, 0.0, 0.0, 10.0, 10.0, 80.0),
                    5.0 * text.chars().count() as f32,
                )],
                viewport: Viewport {
                    transform: Affine::new(scale, 0.0, 0.0, -scale, 0.0, 100.0 * scale),
                    scale,
                    width_px: page_number,
                    height_px: 1,
                },
            })
        }

        fn render_page(
            &self,
            _handle: DocumentHandle,
            layout: &PageLayout,
        ) -> Result<Raster, LayoutError> {
            Ok(Raster::new(layout.viewport.width_px, layout.viewport.height_px))
        }

        fn close_document(&mut self, handle: DocumentHandle) -> Result<(), LayoutError> {
            self.docs.remove(&handle).map(|_| ()).ok_or(LayoutError::InvalidHandle(handle.raw()))
        }
    }

    /// Recognizer returning `"text of page N"`, or failing on one page
    #[derive(Default)]
    pub(crate) struct ScriptedRecognizer {
        pub fail_on: Option<u32>,
        pub calls: RefCell<Vec<u32>>,
        pub hints: RefCell<Vec<Option<String>>>,
    }

    impl ScriptedRecognizer {
        pub fn failing_on(page: u32) -> Self {
            Self { fail_on: Some(page), ..Self::default() }
        }
    }

    impl RecognitionService for ScriptedRecognizer {
        fn recognize(
            &self,
            raster: &Raster,
            language_hint: Option<&str>,
        ) -> Result<String, RecognitionError> {
            let page = raster.width();
            self.calls.borrow_mut().push(page);
            self.hints.borrow_mut().push(language_hint.map(str::to_owned));

            if self.fail_on == Some(page) {
                return Err(RecognitionError::Transport("connection reset".to_owned()));
            }
            Ok(format!("text of page {page}"))
        }
    }

    fn opened(pages: &[&str]) -> (PagePipeline, ScriptedProvider, Epoch) {
        let epoch = Epoch::new();
        let mut provider = ScriptedProvider::default();
        let mut pipeline = PagePipeline::new(PipelineConfig::default());
        pipeline
            .open(&mut provider, ScriptedProvider::encode(pages), epoch.advance())
            .expect("open should succeed");
        (pipeline, provider, epoch)
    }

    #[test]
    fn test_runs_every_page_in_order() {
        let (mut pipeline, provider, _epoch) = opened(&["a", "b", "c"]);
        let recognizer = ScriptedRecognizer::default();

        pipeline.run(&provider, &recognizer, None).expect("run should succeed");

        assert_eq!(pipeline.state(), &PipelineState::Complete);
        assert_eq!(*recognizer.calls.borrow(), vec![1, 2, 3]);

        let document = pipeline.document().unwrap();
        assert!(document.is_complete());
        assert_eq!(document.page_text(2), Some("text of page 2"));
    }

    #[test]
    fn test_fail_stop_keeps_prefix_and_skips_rest() {
        let (mut pipeline, provider, _epoch) = opened(&["1", "2", "3", "4", "5"]);
        let recognizer = ScriptedRecognizer::failing_on(3);

        let err = pipeline.run(&provider, &recognizer, None).expect_err("page 3 fails");

        assert!(matches!(err, PipelineError::PageRecognition { page: 3, .. }));
        assert_eq!(
            err.to_string(),
            "recognition failed on page 3: recognition service unreachable: connection reset"
        );
        assert_eq!(*recognizer.calls.borrow(), vec![1, 2, 3]);
        assert!(matches!(pipeline.state(), PipelineState::Failed(_)));

        let document = pipeline.document().unwrap();
        let kept: Vec<u32> = document.pages().iter().map(|p| p.page_number).collect();
        assert_eq!(kept, vec![1, 2]);
        assert!(!document.is_complete());
        assert!(matches!(document.status(), DocumentStatus::Incomplete { failed_page: 3, .. }));

        // further steps never reach pages 4 and 5
        let state = pipeline.step(&provider, &recognizer, None).unwrap();
        assert!(matches!(state, PipelineState::Failed(_)));
        assert_eq!(*recognizer.calls.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_progress_is_reported_before_each_page() {
        let (mut pipeline, provider, _epoch) = opened(&["a", "b", "c"]);
        let recognizer = ScriptedRecognizer::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback =
            Arc::new(move |p: Progress| sink.lock().unwrap().push(p));

        let state = pipeline.step(&provider, &recognizer, Some(&callback)).unwrap();
        assert_eq!(state, PipelineState::ProcessingPage(2));
        assert_eq!(pipeline.progress(), Some(Progress { page: 1, total_pages: 3 }));

        pipeline.run(&provider, &recognizer, Some(&callback)).unwrap();

        let pages: Vec<(u32, u32)> =
            seen.lock().unwrap().iter().map(|p| (p.page, p.total_pages)).collect();
        assert_eq!(pages, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(pipeline.progress(), None);
    }

    #[test]
    fn test_recognition_scale_and_language_hint() {
        let epoch = Epoch::new();
        let mut provider = ScriptedProvider::default();
        let config = PipelineConfig::new().with_recognition_scale(3.0).with_language("deu");
        let mut pipeline = PagePipeline::new(config);
        pipeline.open(&mut provider, ScriptedProvider::encode(&["x"]), epoch.advance()).unwrap();
        let recognizer = ScriptedRecognizer::default();

        pipeline.run(&provider, &recognizer, None).unwrap();

        assert_eq!(*provider.layout_calls.borrow(), vec![(1, 3.0)]);
        assert_eq!(*recognizer.hints.borrow(), vec![Some("deu".to_owned())]);
    }

    #[test]
    fn test_zero_page_document_completes_immediately() {
        let (mut pipeline, provider, _epoch) = opened(&[]);
        let recognizer = ScriptedRecognizer::default();

        assert_eq!(pipeline.state(), &PipelineState::Complete);
        pipeline.run(&provider, &recognizer, None).unwrap();
        assert!(recognizer.calls.borrow().is_empty());
    }

    #[test]
    fn test_open_failure_leaves_no_document() {
        let epoch = Epoch::new();
        let mut provider = ScriptedProvider::default();
        let mut pipeline = PagePipeline::new(PipelineConfig::default());

        let err = pipeline
            .open(&mut provider, b"bad\0".to_vec(), epoch.advance())
            .expect_err("corrupt input");

        assert!(matches!(err, PipelineError::DocumentOpen(_)));
        assert!(matches!(pipeline.state(), PipelineState::Failed(_)));
        assert!(pipeline.document().is_none());
    }

    #[test]
    fn test_layout_failure_is_fail_stop() {
        let epoch = Epoch::new();
        let mut provider = ScriptedProvider { fail_layout_on: Some(2), ..Default::default() };
        let mut pipeline = PagePipeline::new(PipelineConfig::default());
        let bytes = ScriptedProvider::encode(&["a", "b", "c"]);
        pipeline.open(&mut provider, bytes, epoch.advance()).unwrap();
        let recognizer = ScriptedRecognizer::default();

        let err = pipeline.run(&provider, &recognizer, None).unwrap_err();

        assert!(matches!(err, PipelineError::PageLayout { page: 2, .. }));
        assert_eq!(*recognizer.calls.borrow(), vec![1]);
        assert_eq!(pipeline.document().unwrap().pages().len(), 1);
    }

    #[test]
    fn test_superseded_pipeline_refuses_to_step() {
        let (mut pipeline, provider, epoch) = opened(&["a", "b"]);
        let recognizer = ScriptedRecognizer::default();
        pipeline.step(&provider, &recognizer, None).unwrap();

        epoch.advance();
        let err = pipeline.step(&provider, &recognizer, None).unwrap_err();

        assert!(matches!(err, PipelineError::Superseded));
        assert_eq!(*recognizer.calls.borrow(), vec![1]);
        assert!(pipeline.document().is_none());
        assert!(pipeline.handle().is_none());
        assert!(pipeline.is_superseded());
    }

    #[test]
    fn test_superseded_handle_is_closed_on_close() {
        let (mut pipeline, mut provider, epoch) = opened(&["a", "b"]);
        let recognizer = ScriptedRecognizer::default();
        epoch.advance();
        pipeline.step(&provider, &recognizer, None).unwrap_err();
        assert_eq!(provider.docs.len(), 1);

        pipeline.close(&mut provider).unwrap();

        assert!(provider.docs.is_empty());
    }

    #[test]
    fn test_reopening_closes_previous_handle() {
        let (mut pipeline, mut provider, epoch) = opened(&["a"]);

        pipeline.open(&mut provider, ScriptedProvider::encode(&["b"]), epoch.advance()).unwrap();
        assert_eq!(provider.docs.len(), 1);

        assert!(pipeline.take_document().is_some());
        assert_eq!(pipeline.state(), &PipelineState::Idle);
        pipeline.open(&mut provider, ScriptedProvider::encode(&["c"]), epoch.advance()).unwrap();

        assert_eq!(provider.docs.len(), 1);
        assert_eq!(provider.docs.values().next().unwrap(), &vec!["c".to_owned()]);
    }

    #[test]
    fn test_error_message_carries_cause_once() {
        let err = PipelineError::PageRecognition {
            page: 1,
            cause: RecognitionError::Transport("refused".to_owned()),
        };

        assert!(std::error::Error::source(&err).is_none());
        assert_eq!(
            err.to_string(),
            "recognition failed on page 1: recognition service unreachable: refused"
        );
    }

    #[test]
    fn test_step_before_open_is_an_error() {
        let provider = ScriptedProvider::default();
        let recognizer = ScriptedRecognizer::default();
        let mut pipeline = PagePipeline::new(PipelineConfig::default());

        assert!(matches!(
            pipeline.step(&provider, &recognizer, None),
            Err(PipelineError::NotOpened)
        ));
    }

    #[test]
    fn test_close_releases_handle() {
        let (mut pipeline, mut provider, _epoch) = opened(&["a"]);
        assert_eq!(provider.docs.len(), 1);

        pipeline.close(&mut provider).unwrap();

        assert!(provider.docs.is_empty());
        assert_eq!(pipeline.state(), &PipelineState::Idle);
    }

    #[test]
    fn test_progress_fraction_and_message() {
        let progress = Progress { page: 2, total_pages: 4 };
        assert_eq!(progress.fraction(), 0.5);
        assert_eq!(progress.message(), "Processing page 2 of 4");
    }
}
