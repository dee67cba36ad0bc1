//! PDF-backed layout provider.
//!
//! Opens documents with `lopdf`, extracts positioned text fragments from page
//! content streams, and produces a viewport canvas for each page.

mod text;

use doc_model::{
    Affine, DocumentHandle, LayoutError, LayoutProvider, OpenedDocument, PageLayout, Raster,
    Viewport,
};
use image::Rgba;
use lopdf::{Document, ObjectId};
use std::collections::HashMap;

const DEFAULT_MEDIA_BOX: MediaBox = MediaBox { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl MediaBox {
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }

    /// Page space (origin bottom-left) to viewport pixels (origin top-left).
    pub fn viewport(&self, scale: f32) -> Viewport {
        let scale = if scale <= 0.0 { 1.0 } else { scale };
        let x0 = self.x0.min(self.x1);
        let y1 = self.y0.max(self.y1);

        Viewport {
            transform: Affine::new(scale, 0.0, 0.0, -scale, -x0 * scale, y1 * scale),
            scale,
            width_px: (self.width() * scale).round().max(1.0) as u32,
            height_px: (self.height() * scale).round().max(1.0) as u32,
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    doc: Document,
    pages: Vec<(ObjectId, MediaBox)>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(bytes: &[u8]) -> Result<DocumentRecord, LayoutError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(LayoutError::InvalidDocument("encrypted PDFs are not supported".to_owned()));
        }

        let doc =
            Document::load_mem(bytes).map_err(|e| LayoutError::InvalidDocument(e.to_string()))?;

        let mut pages = Vec::new();
        for (_, page_id) in doc.get_pages() {
            let media_box = doc
                .get_dictionary(page_id)
                .ok()
                .and_then(|page| text::inherited(&doc, page, b"MediaBox"))
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = text::resolve(&doc, &array[0])?.as_float().ok()?;
                    let y0 = text::resolve(&doc, &array[1])?.as_float().ok()?;
                    let x1 = text::resolve(&doc, &array[2])?.as_float().ok()?;
                    let y1 = text::resolve(&doc, &array[3])?.as_float().ok()?;
                    Some(MediaBox { x0, y0, x1, y1 })
                })
                .unwrap_or(DEFAULT_MEDIA_BOX);

            pages.push((page_id, media_box));
        }

        Ok(DocumentRecord { doc, pages })
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, LayoutError> {
        self.docs.get(&handle).ok_or(LayoutError::InvalidHandle(handle.raw()))
    }

    fn page(
        &self,
        handle: DocumentHandle,
        page_number: u32,
    ) -> Result<(&DocumentRecord, ObjectId, MediaBox), LayoutError> {
        let record = self.record(handle)?;
        let page_count = record.pages.len() as u32;

        if page_number == 0 || page_number > page_count {
            return Err(LayoutError::PageOutOfRange { page: page_number, page_count });
        }

        let (page_id, media_box) = record.pages[(page_number - 1) as usize];
        Ok((record, page_id, media_box))
    }
}

impl LayoutProvider for LopdfEngine {
    fn open_document(&mut self, bytes: Vec<u8>) -> Result<OpenedDocument, LayoutError> {
        let record = Self::parse(&bytes)?;
        let total_pages = record.pages.len() as u32;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, record);

        log::info!("opened document {} with {} pages", handle.raw(), total_pages);
        Ok(OpenedDocument { handle, total_pages })
    }

    fn page_layout(
        &self,
        handle: DocumentHandle,
        page_number: u32,
        scale: f32,
    ) -> Result<PageLayout, LayoutError> {
        let (record, page_id, media_box) = self.page(handle, page_number)?;

        let fragments = text::extract_fragments(&record.doc, page_id)
            .map_err(|e| LayoutError::Render(format!("page {page_number}: {e}")))?;
        log::debug!("page {page_number}: {} text fragments", fragments.len());

        Ok(PageLayout { page_number, fragments, viewport: media_box.viewport(scale) })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        layout: &PageLayout,
    ) -> Result<Raster, LayoutError> {
        self.page(handle, layout.page_number)?;

        let width = layout.viewport.width_px.max(1);
        let height = layout.viewport.height_px.max(1);
        let mut image = Raster::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }

    fn close_document(&mut self, handle: DocumentHandle) -> Result<(), LayoutError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(LayoutError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}
