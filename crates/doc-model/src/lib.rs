use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};

pub type Raster = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// 2x3 affine matrix `[a, b, c, d, e, f]`, mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f32; 6]);

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self([a, b, c, d, e, f])
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, x, y])
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Applies `inner` first, then `outer`.
    pub fn compose(outer: &Affine, inner: &Affine) -> Affine {
        let [m1a, m1b, m1c, m1d, m1e, m1f] = outer.0;
        let [m2a, m2b, m2c, m2d, m2e, m2f] = inner.0;

        Affine([
            m1a * m2a + m1c * m2b,
            m1b * m2a + m1d * m2b,
            m1a * m2c + m1c * m2d,
            m1b * m2c + m1d * m2d,
            m1a * m2e + m1c * m2f + m1e,
            m1b * m2e + m1d * m2f + m1f,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    pub fn a(&self) -> f32 {
        self.0[0]
    }

    pub fn b(&self) -> f32 {
        self.0[1]
    }

    pub fn c(&self) -> f32 {
        self.0[2]
    }

    pub fn d(&self) -> f32 {
        self.0[3]
    }

    pub fn e(&self) -> f32 {
        self.0[4]
    }

    pub fn f(&self) -> f32 {
        self.0[5]
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One run of laid-out text in page space. `width` is the advance in page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub transform: Affine,
    pub width: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, transform: Affine, width: f32) -> Self {
        Self { text: text.into(), transform, width }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub transform: Affine,
    pub scale: f32,
    pub width_px: u32,
    pub height_px: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_number: u32,
    pub fragments: Vec<TextFragment>,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedPage {
    pub page_number: u32,
    pub text: String,
}

impl RecognizedPage {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self { page_number, text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentHandle(pub u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedDocument {
    pub handle: DocumentHandle,
    pub total_pages: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("not a valid document: {0}")]
    InvalidDocument(String),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("render error: {0}")]
    Render(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces page geometry and rasters for an opened document.
///
/// Page numbers are 1-based.
pub trait LayoutProvider {
    fn open_document(&mut self, bytes: Vec<u8>) -> Result<OpenedDocument, LayoutError>;

    fn page_layout(
        &self,
        handle: DocumentHandle,
        page_number: u32,
        scale: f32,
    ) -> Result<PageLayout, LayoutError>;

    fn render_page(&self, handle: DocumentHandle, layout: &PageLayout)
        -> Result<Raster, LayoutError>;

    fn close_document(&mut self, handle: DocumentHandle) -> Result<(), LayoutError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition service unreachable: {0}")]
    Transport(String),
    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),
    #[error("failed to encode page image: {0}")]
    Encode(String),
}

/// Turns a page raster into plain text. One call per page.
pub trait RecognitionService {
    fn recognize(
        &self,
        raster: &Raster,
        language_hint: Option<&str>,
    ) -> Result<String, RecognitionError>;
}

impl<T: RecognitionService + ?Sized> RecognitionService for &T {
    fn recognize(
        &self,
        raster: &Raster,
        language_hint: Option<&str>,
    ) -> Result<String, RecognitionError> {
        (**self).recognize(raster, language_hint)
    }
}

impl<T: RecognitionService + ?Sized> RecognitionService for Box<T> {
    fn recognize(
        &self,
        raster: &Raster,
        language_hint: Option<&str>,
    ) -> Result<String, RecognitionError> {
        (**self).recognize(raster, language_hint)
    }
}
