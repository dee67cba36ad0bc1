//! Case-insensitive substring matching over flat page text

use std::collections::BTreeSet;

/// Half-open char span `[start, end)` of one match in the flat text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Lowercase a single char, keeping it unchanged when its lowercase form
/// expands to more than one char. Keeps folded text the same length as the
/// input.
fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(folded), None) => folded,
        _ => c,
    }
}

fn fold(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

/// Find every match of `query` in `flat_text`
///
/// Matching is case-insensitive and scans left to right; after a match the
/// scan resumes at its end, so returned spans never overlap and are sorted
/// ascending. An empty query yields no matches.
pub fn find_matches(flat_text: &str, query: &str) -> Vec<MatchSpan> {
    let needle = fold(query);
    if needle.is_empty() {
        return Vec::new();
    }

    let haystack = fold(flat_text);
    let mut matches = Vec::new();
    let mut position = 0;

    while position + needle.len() <= haystack.len() {
        if haystack[position..position + needle.len()] == needle[..] {
            let span = MatchSpan::new(position, position + needle.len());
            matches.push(span);
            position = span.end;
        } else {
            position += 1;
        }
    }

    matches
}

/// Indices of the fragments a match overlaps
///
/// Fragment `j` covers `[offsets[j], offsets[j] + lengths[j])` and overlaps
/// the match only when the two spans share at least one position. Spans that
/// merely touch do not overlap.
pub fn overlapping_fragments(
    span: MatchSpan,
    offsets: &[usize],
    lengths: &[usize],
) -> BTreeSet<usize> {
    // offsets are ascending, so fragments starting at or after the match end
    // can be skipped wholesale
    let candidates = offsets.partition_point(|&offset| offset < span.end);

    offsets[..candidates]
        .iter()
        .zip(lengths)
        .enumerate()
        .filter(|&(_, (&offset, &length))| {
            offset.max(span.start) < (offset + length).min(span.end)
        })
        .map(|(index, _)| index)
        .collect()
}

/// Whether `text` contains at least one match for `query`
pub fn page_has_match(text: &str, query: &str) -> bool {
    !find_matches(text, query).is_empty()
}
