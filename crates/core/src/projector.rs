//! Fragment geometry to viewport pixels

use doc_model::{Affine, HighlightRect, TextFragment, Viewport};

/// Glyph height implied by a transform: the length of its vertical basis
/// vector.
pub fn text_height(transform: &Affine) -> f32 {
    transform.c().hypot(transform.d())
}

/// Project one fragment onto the viewport as a highlight rectangle.
///
/// The fragment transform places the glyph baseline; the rectangle extends
/// upward from it by the text height. Width is the fragment advance scaled
/// to viewport pixels.
pub fn project(fragment: &TextFragment, viewport: &Viewport) -> HighlightRect {
    let tx = Affine::compose(&viewport.transform, &fragment.transform);
    let height = text_height(&tx);

    HighlightRect {
        x: tx.e(),
        y: tx.f() - height,
        width: fragment.width * viewport.scale,
        height,
    }
}
