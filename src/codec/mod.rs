//! Reference detection over free-form article text.
//!
//! Everything in this module is a pure function of its inputs: no I/O and no shared state.
//! Work on different entities can run in parallel; the rewrite of one entity cannot.
//!
//! ## Pipeline
//!
//! 1. [`parser::parse_references`] extracts the explicit tokens already in a body:
//!    bracket links `[[<id>]]` / `[[<id>|<display>]]` and hash tags `#name`.
//! 2. [`protect::protected_ranges`] marks spans that must never be rewritten (existing tokens,
//!    markdown links, inline code, HTML tags).
//! 3. [`scan::scan`] finds implicit mentions of known names, longest name first.
//! 4. [`rewrite::rewrite`] substitutes the mentions from the end of the text backwards.
//!
//! ```rust
//! use lorelink::{
//!     codec::{parse_references, protected_ranges, rewrite, scan, CandidateSet, link_token},
//!     properties::EntityId,
//! };
//!
//! let harbor = EntityId::new();
//! let candidates = CandidateSet::builder().title(harbor, "Waterdeep Harbor").build()?;
//! let text = "Ships crowd Waterdeep Harbor at dawn.";
//!
//! let occurrences = scan(text, &candidates, &protected_ranges(text))?;
//! let rewritten = rewrite(text, &occurrences, link_token);
//!
//! assert_eq!(rewritten.applied, 1);
//! assert_eq!(parse_references(Some(&rewritten.text))[0].link_target(), Some(harbor));
//! # Ok::<(), lorelink::LinkGraphError>(())
//! ```
//!
//! ## Offsets
//!
//! Ranges are byte offsets into the UTF-8 text so they can slice it directly. Positions that get
//! persisted ([`ParsedReference::position`]) are character offsets.

pub mod parser;
pub mod protect;
pub mod rewrite;
pub mod scan;
pub mod slug;

pub use parser::{parse_references, tokenize, ParsedReference, ReferenceKind, Token, TokenKind};
pub use protect::{protected_ranges, ProtectedRanges};
pub use rewrite::{highlight, link_token, rewrite, strip_highlight, tag_token, Rewrite};
pub use scan::{scan, CandidateName, CandidateSet, CandidateSetBuilder, Occurrence};
pub use slug::{generate_slug, is_valid_slug, tag_slug};

/// Names shorter than this many characters are never matched.
pub const MIN_NAME_CHARS: usize = 3;
/// Largest body the scanner accepts.
pub const MAX_SCAN_BYTES: usize = 1 << 20;
/// Largest number of matchable names in one [CandidateSet].
pub const MAX_CANDIDATE_NAMES: usize = 20_000;

/// Word characters for boundary purposes, matching the regex `\w` class closely enough for
/// titles.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Converts ascending byte offsets into character offsets in a single pass over the text.
#[derive(Debug)]
pub(crate) struct CharOffsets<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        CharOffsets {
            text,
            byte: 0,
            chars: 0,
        }
    }

    pub(crate) fn char_offset(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// A short excerpt of `text` centred on the character offset `position`, used for backlink
/// previews.
pub fn snippet(text: &str, position: usize, radius: usize) -> String {
    let start = position.saturating_sub(radius);
    let total = text.chars().count();
    let end = (position + radius).min(total);
    let window = text
        .chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect::<String>();
    let window = window.split_whitespace().collect::<Vec<&str>>().join(" ");

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&window);
    if end < total {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_char_offsets_are_incremental() {
        let text = "héllo wörld";
        let mut offsets = CharOffsets::new(text);
        assert_eq!(offsets.char_offset(0), 0);
        assert_eq!(offsets.char_offset(3), 2);
        let w = text.find('w').unwrap();
        assert_eq!(offsets.char_offset(w), 6);
        // Going backwards restarts the count.
        assert_eq!(offsets.char_offset(1), 1);
    }

    #[test]
    fn test_snippet_window() {
        let text = "The fleet sailed from Waterdeep at dawn";
        let at = text.find("Waterdeep").unwrap();
        assert_eq!(snippet(text, at, 8), "...ed from Waterdee...");
        assert_eq!(snippet("short", 0, 40), "short");
    }
}
