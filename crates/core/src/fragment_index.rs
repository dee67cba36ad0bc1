//! Flat text index over a page's text fragments
//!
//! Concatenates fragment text with no separator and records where each
//! fragment starts, so that a match in the flat string can be mapped back
//! onto the fragments that produced it. Layout providers pre-segment text,
//! and a word split across two fragments still matches as one word.
//!
//! All positions are counted in `char`s, not bytes.

use doc_model::TextFragment;
use std::ops::Range;

/// Flat text plus the offset table for one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentIndex {
    /// Concatenated fragment text
    flat_text: String,

    /// `offsets[i]` is the char position where fragment `i` begins
    offsets: Vec<usize>,

    /// `lengths[i]` is the char length of fragment `i`
    lengths: Vec<usize>,
}

impl FragmentIndex {
    /// Build the index for an ordered fragment sequence
    pub fn build(fragments: &[TextFragment]) -> Self {
        let capacity = fragments.iter().map(|f| f.text.len()).sum();
        let mut flat_text = String::with_capacity(capacity);
        let mut offsets = Vec::with_capacity(fragments.len());
        let mut lengths = Vec::with_capacity(fragments.len());

        let mut position = 0;
        for fragment in fragments {
            let length = fragment.text.chars().count();
            offsets.push(position);
            lengths.push(length);
            flat_text.push_str(&fragment.text);
            position += length;
        }

        Self { flat_text, offsets, lengths }
    }

    /// The concatenated text
    pub fn flat_text(&self) -> &str {
        &self.flat_text
    }

    /// Start position of every fragment
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Char length of every fragment
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Number of fragments indexed
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no fragments were indexed
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total length of the flat text in chars
    pub fn char_len(&self) -> usize {
        match (self.offsets.last(), self.lengths.last()) {
            (Some(offset), Some(length)) => offset + length,
            _ => 0,
        }
    }

    /// Char span `[start, end)` covered by fragment `index`
    pub fn fragment_span(&self, index: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(index)?;
        let length = *self.lengths.get(index)?;
        Some(start..start + length)
    }

    /// Text of the flat string between two char positions
    pub fn slice(&self, range: Range<usize>) -> String {
        let count = range.end.saturating_sub(range.start);
        self.flat_text.chars().skip(range.start).take(count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::Affine;

    fn fragments(texts: &[&str]) -> Vec<TextFragment> {
        texts.iter().map(|t| TextFragment::new(*t, Affine::IDENTITY, 10.0)).collect()
    }

    #[test]
    fn test_build_concatenates_without_separator() {
        let index = FragmentIndex::build(&fragments(&["Hel", "lo Wor", "ld"]));

        assert_eq!(index.flat_text(), "Hello World");
        assert_eq!(index.offsets(), &[0, 3, 9]);
        assert_eq!(index.lengths(), &[3, 6, 2]);
        assert_eq!(index.char_len(), 11);
    }

    #[test]
    fn test_offsets_are_contiguous() {
        let input = fragments(&["alpha", "", "β-γ", " ", "delta"]);
        let index = FragmentIndex::build(&input);

        assert_eq!(index.offsets().len(), input.len());
        for i in 0..input.len() - 1 {
            assert_eq!(
                index.offsets()[i] + input[i].text.chars().count(),
                index.offsets()[i + 1]
            );
        }
        let last = input.len() - 1;
        assert_eq!(
            index.offsets()[last] + input[last].text.chars().count(),
            index.flat_text().chars().count()
        );
    }

    #[test]
    fn test_slices_reconstruct_flat_text() {
        let index = FragmentIndex::build(&fragments(&["Über", "straße ", "", "42"]));

        let rebuilt: String = (0..index.len())
            .map(|i| index.slice(index.fragment_span(i).unwrap()))
            .collect();

        assert_eq!(rebuilt, index.flat_text());
    }

    #[test]
    fn test_positions_count_chars_not_bytes() {
        let index = FragmentIndex::build(&fragments(&["né", "e"]));

        assert_eq!(index.offsets(), &[0, 2]);
        assert_eq!(index.fragment_span(1), Some(2..3));
        assert_eq!(index.slice(1..3), "ée");
    }

    #[test]
    fn test_empty_page() {
        let index = FragmentIndex::build(&[]);

        assert!(index.is_empty());
        assert_eq!(index.flat_text(), "");
        assert_eq!(index.char_len(), 0);
        assert_eq!(index.fragment_span(0), None);
    }

    #[test]
    fn test_build_is_deterministic() {
        let input = fragments(&["one ", "two ", "three"]);
        assert_eq!(FragmentIndex::build(&input), FragmentIndex::build(&input));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn texts() -> impl Strategy<Value = Vec<String>> {
            proptest::collection::vec("[a-zA-Z ßẞİé]{0,6}", 0..8)
        }

        proptest! {
            #[test]
            fn offsets_are_contiguous(texts in texts()) {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let index = FragmentIndex::build(&fragments(&refs));

                prop_assert_eq!(index.len(), texts.len());
                let mut expected = 0;
                for (offset, length) in index.offsets().iter().zip(index.lengths()) {
                    prop_assert_eq!(*offset, expected);
                    expected += length;
                }
                prop_assert_eq!(index.char_len(), expected);
                prop_assert_eq!(index.flat_text().chars().count(), expected);
            }

            #[test]
            fn fragments_round_trip_through_flat_text(texts in texts()) {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let index = FragmentIndex::build(&fragments(&refs));

                prop_assert_eq!(index.flat_text(), texts.concat());
                for (i, text) in texts.iter().enumerate() {
                    let span = index.fragment_span(i).expect("indexed fragment");
                    prop_assert_eq!(&index.slice(span), text);
                }
            }

            #[test]
            fn build_is_deterministic(texts in texts()) {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let input = fragments(&refs);

                prop_assert_eq!(FragmentIndex::build(&input), FragmentIndex::build(&input));
            }
        }
    }
}
