//! Content-stream walk that turns text-showing operators into positioned fragments.

use doc_model::{Affine, TextFragment};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;

const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

#[derive(Debug, Clone, Default)]
pub(crate) struct FontMetrics {
    first_char: u32,
    widths: Vec<f32>,
}

impl FontMetrics {
    fn glyph_width(&self, code: u8) -> f32 {
        let code = u32::from(code);
        if code < self.first_char {
            return DEFAULT_GLYPH_WIDTH;
        }

        self.widths.get((code - self.first_char) as usize).copied().unwrap_or(DEFAULT_GLYPH_WIDTH)
    }
}

/// Graphics-state parameters pushed by `q` and popped by `Q`
#[derive(Debug, Clone)]
struct SavedState {
    ctm: Affine,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Affine,
    saved: Vec<SavedState>,
    text_matrix: Affine,
    line_matrix: Affine,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Affine::IDENTITY,
            saved: Vec::new(),
            text_matrix: Affine::IDENTITY,
            line_matrix: Affine::IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl TextState {
    fn save(&mut self) {
        self.saved.push(SavedState {
            ctm: self.ctm,
            font: self.font.clone(),
            font_size: self.font_size,
            char_spacing: self.char_spacing,
            word_spacing: self.word_spacing,
            horizontal_scale: self.horizontal_scale,
            leading: self.leading,
            rise: self.rise,
        });
    }

    fn restore(&mut self) {
        let Some(saved) = self.saved.pop() else {
            return;
        };
        self.ctm = saved.ctm;
        self.font = saved.font;
        self.font_size = saved.font_size;
        self.char_spacing = saved.char_spacing;
        self.word_spacing = saved.word_spacing;
        self.horizontal_scale = saved.horizontal_scale;
        self.leading = saved.leading;
        self.rise = saved.rise;
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Affine::compose(&self.line_matrix, &Affine::translate(tx, ty));
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = Affine::compose(&self.text_matrix, &Affine::translate(tx, 0.0));
    }

    fn rendering_matrix(&self) -> Affine {
        let font_matrix = Affine::new(
            self.font_size * self.horizontal_scale,
            0.0,
            0.0,
            self.font_size,
            0.0,
            self.rise,
        );
        Affine::compose(&self.ctm, &Affine::compose(&self.text_matrix, &font_matrix))
    }

    /// Horizontal advance in unscaled text space for one glyph.
    fn glyph_advance(&self, metrics: &FontMetrics, code: u8) -> f32 {
        let mut advance = metrics.glyph_width(code) / 1000.0 * self.font_size + self.char_spacing;
        if code == b' ' {
            advance += self.word_spacing;
        }
        advance * self.horizontal_scale
    }
}

enum ShowItem<'a> {
    Bytes(&'a [u8]),
    Adjust(f32),
}

/// Walks a page's content stream and returns one fragment per text-showing operator.
pub(crate) fn extract_fragments(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<TextFragment>, lopdf::Error> {
    let raw = doc.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;
    let fonts = page_font_metrics(doc, page_id);

    let mut state = TextState::default();
    let mut fragments = Vec::new();

    for op in &content.operations {
        apply_operation(op, &fonts, &mut state, &mut fragments);
    }

    Ok(fragments)
}

fn apply_operation(
    op: &Operation,
    fonts: &HashMap<Vec<u8>, FontMetrics>,
    state: &mut TextState,
    fragments: &mut Vec<TextFragment>,
) {
    let number = |i: usize| op.operands.get(i).and_then(|o| o.as_float().ok());

    match op.operator.as_str() {
        "q" => state.save(),
        "Q" => state.restore(),
        "cm" => {
            if let Some(m) = matrix_operands(&op.operands) {
                state.ctm = Affine::compose(&state.ctm, &m);
            }
        }
        "BT" => {
            state.text_matrix = Affine::IDENTITY;
            state.line_matrix = Affine::IDENTITY;
        }
        "ET" => {}
        "Tf" => {
            if let Some(Ok(name)) = op.operands.first().map(Object::as_name) {
                state.font = Some(name.to_vec());
            }
            if let Some(size) = number(1) {
                state.font_size = size;
            }
        }
        "Tm" => {
            if let Some(m) = matrix_operands(&op.operands) {
                state.text_matrix = m;
                state.line_matrix = m;
            }
        }
        "Td" => {
            if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                state.translate_line(tx, ty);
            }
        }
        "TD" => {
            if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                state.leading = -ty;
                state.translate_line(tx, ty);
            }
        }
        "T*" => state.translate_line(0.0, -state.leading),
        "TL" => {
            if let Some(v) = number(0) {
                state.leading = v;
            }
        }
        "Tc" => {
            if let Some(v) = number(0) {
                state.char_spacing = v;
            }
        }
        "Tw" => {
            if let Some(v) = number(0) {
                state.word_spacing = v;
            }
        }
        "Tz" => {
            if let Some(v) = number(0) {
                state.horizontal_scale = v / 100.0;
            }
        }
        "Ts" => {
            if let Some(v) = number(0) {
                state.rise = v;
            }
        }
        "Tj" => {
            if let Some(Object::String(bytes, _)) = op.operands.first() {
                show(&[ShowItem::Bytes(bytes)], fonts, state, fragments);
            }
        }
        "TJ" => {
            if let Some(Object::Array(items)) = op.operands.first() {
                let items: Vec<ShowItem<'_>> = items
                    .iter()
                    .filter_map(|item| match item {
                        Object::String(bytes, _) => Some(ShowItem::Bytes(bytes)),
                        other => other.as_float().ok().map(ShowItem::Adjust),
                    })
                    .collect();
                show(&items, fonts, state, fragments);
            }
        }
        "'" => {
            state.translate_line(0.0, -state.leading);
            if let Some(Object::String(bytes, _)) = op.operands.first() {
                show(&[ShowItem::Bytes(bytes)], fonts, state, fragments);
            }
        }
        "\"" => {
            if let (Some(aw), Some(ac)) = (number(0), number(1)) {
                state.word_spacing = aw;
                state.char_spacing = ac;
            }
            state.translate_line(0.0, -state.leading);
            if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                show(&[ShowItem::Bytes(bytes)], fonts, state, fragments);
            }
        }
        _ => {}
    }
}

fn show(
    items: &[ShowItem<'_>],
    fonts: &HashMap<Vec<u8>, FontMetrics>,
    state: &mut TextState,
    fragments: &mut Vec<TextFragment>,
) {
    let fallback = FontMetrics::default();
    let metrics = state.font.as_ref().and_then(|name| fonts.get(name)).unwrap_or(&fallback);

    let start = state.rendering_matrix();
    let advance_scale = {
        let m = Affine::compose(&state.ctm, &state.text_matrix);
        m.a().hypot(m.b())
    };

    let mut text = String::new();
    let mut advance = 0.0f32;

    for item in items {
        match item {
            ShowItem::Bytes(bytes) => {
                for &code in bytes.iter() {
                    let glyph = state.glyph_advance(metrics, code);
                    advance += glyph;
                    state.advance(glyph);
                    if !code.is_ascii_control() {
                        text.push(char::from(code));
                    }
                }
            }
            ShowItem::Adjust(amount) => {
                let shift = -amount / 1000.0 * state.font_size * state.horizontal_scale;
                advance += shift;
                state.advance(shift);
            }
        }
    }

    if text.is_empty() {
        return;
    }

    fragments.push(TextFragment::new(text, start, advance * advance_scale));
}

fn matrix_operands(operands: &[Object]) -> Option<Affine> {
    if operands.len() < 6 {
        return None;
    }

    let mut values = [0.0f32; 6];
    for (slot, operand) in values.iter_mut().zip(operands) {
        *slot = operand.as_float().ok()?;
    }
    Some(Affine(values))
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks `key` up on the page dictionary, then on its `/Parent` chain.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok().and_then(|p| resolve(doc, p))?;
        current = parent.as_dict().ok()?;
    }
    None
}

fn page_font_metrics(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontMetrics> {
    let mut fonts = HashMap::new();

    let Ok(page) = doc.get_dictionary(page_id) else {
        return fonts;
    };
    let Some(font_dict) = inherited(doc, page, b"Resources")
        .and_then(|res| res.as_dict().ok())
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|f| resolve(doc, f))
        .and_then(|f| f.as_dict().ok())
    else {
        return fonts;
    };

    for (name, font) in font_dict.iter() {
        let Some(font) = resolve(doc, font).and_then(|f| f.as_dict().ok()) else {
            continue;
        };

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|v| resolve(doc, v))
            .and_then(|v| v.as_i64().ok())
            .unwrap_or(0)
            .max(0) as u32;
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|w| resolve(doc, w))
            .and_then(|w| w.as_array().ok())
            .map(|array| {
                array
                    .iter()
                    .map(|w| {
                        resolve(doc, w)
                            .and_then(|w| w.as_float().ok())
                            .unwrap_or(DEFAULT_GLYPH_WIDTH)
                    })
                    .collect()
            })
            .unwrap_or_default();

        fonts.insert(name.clone(), FontMetrics { first_char, widths });
    }

    fonts
}
