//! Spans of a body that implicit-mention rewriting must leave alone.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::codec::parser::tokenize;

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^\)]+)\)").expect("markdown link pattern is valid"));

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern is valid"));

// Editor-rendered link elements: their inner text is a rendered reference, not prose.
static LINK_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<span[^>]*data-type="(?:wiki-link|external-link)"[^>]*>.*?</span>"#)
        .expect("link element pattern is valid")
});

/// A sorted list of disjoint half-open byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedRanges {
    ranges: Vec<Range<usize>>,
}

impl ProtectedRanges {
    pub fn new() -> Self {
        ProtectedRanges::default()
    }

    /// Builds the list from ranges in any order; overlapping and touching ranges are merged.
    pub fn from_ranges<I: IntoIterator<Item = Range<usize>>>(ranges: I) -> Self {
        let mut ranges = ranges
            .into_iter()
            .filter(|r| r.start < r.end)
            .collect::<Vec<Range<usize>>>();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        ProtectedRanges { ranges: merged }
    }

    /// True if `start..end` shares at least one byte with a protected range.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        if start >= end {
            return false;
        }
        let idx = self.ranges.partition_point(|r| r.end <= start);
        self.ranges.get(idx).is_some_and(|r| r.start < end)
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.overlaps(pos, pos + 1)
    }

    /// Adds a range, merging it with any neighbours it touches.
    pub fn insert(&mut self, range: Range<usize>) {
        if range.start >= range.end {
            return;
        }
        let first = self.ranges.partition_point(|r| r.end < range.start);
        let last = self.ranges.partition_point(|r| r.start <= range.end);
        if first == last {
            self.ranges.insert(first, range);
            return;
        }
        let start = range.start.min(self.ranges[first].start);
        let end = range.end.max(self.ranges[last - 1].end);
        self.ranges.splice(first..last, std::iter::once(start..end));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Inline code spans, pairing backticks in order. An unterminated opening backtick protects the
/// rest of the text.
fn code_spans(text: &str) -> Vec<Range<usize>> {
    let ticks = text
        .match_indices('`')
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    ticks
        .chunks(2)
        .map(|pair| match pair {
            [open, close] => *open..close + 1,
            [open] => *open..text.len(),
            _ => 0..0,
        })
        .collect()
}

/// Every span of `text` that must not be rewritten: existing reference tokens (well-formed or
/// not), markdown links, inline code, HTML tags and rendered link elements.
pub fn protected_ranges(text: &str) -> ProtectedRanges {
    let tokens = tokenize(text).into_iter().map(|t| t.span);
    let links = MARKDOWN_LINK.find_iter(text).map(|m| m.range());
    let tags = HTML_TAG.find_iter(text).map(|m| m.range());
    let elements = LINK_ELEMENT.find_iter(text).map(|m| m.range());

    ProtectedRanges::from_ranges(
        tokens
            .chain(links)
            .chain(code_spans(text))
            .chain(tags)
            .chain(elements),
    )
}
