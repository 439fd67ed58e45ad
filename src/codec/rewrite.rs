//! Substitution of scanned occurrences with explicit tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::Occurrence;

static HIGHLIGHT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?mark>").expect("highlight marker pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub text: String,
    /// Number of substitutions actually made.
    pub applied: usize,
}

/// Replaces each occurrence with `render(occurrence)`, working from the end of the text
/// backwards so earlier offsets stay valid.
///
/// Occurrences that fall outside `text`, split a character, or overlap one already applied are
/// skipped.
pub fn rewrite<F>(text: &str, occurrences: &[Occurrence], render: F) -> Rewrite
where
    F: Fn(&Occurrence) -> String,
{
    let mut ordered = occurrences.iter().collect::<Vec<&Occurrence>>();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut out = text.to_string();
    let mut applied = 0;
    // Everything at or beyond `floor` has already been rewritten.
    let mut floor = text.len();
    for occ in ordered {
        let end = occ.end();
        if end > floor || !text.is_char_boundary(occ.start) || !text.is_char_boundary(end) {
            tracing::debug!(
                "[rewrite] skipping occurrence of '{}' at {}..{}",
                occ.matched_text,
                occ.start,
                end
            );
            continue;
        }
        out.replace_range(occ.start..end, &render(occ));
        floor = occ.start;
        applied += 1;
    }
    Rewrite { text: out, applied }
}

/// `[[<id>|<matched text>]]`. Matched text that would break the token syntax is dropped in
/// favour of the bare `[[<id>]]` form.
pub fn link_token(occ: &Occurrence) -> String {
    if occ.matched_text.contains(['[', ']', '|']) {
        format!("[[{}]]", occ.candidate)
    } else {
        format!("[[{}|{}]]", occ.candidate, occ.matched_text)
    }
}

pub fn tag_token(slug: &str) -> String {
    format!("#{slug}")
}

pub fn highlight(token: &str) -> String {
    format!("<mark>{token}</mark>")
}

/// Removes the `<mark>` markers added by [highlight].
pub fn strip_highlight(text: &str) -> String {
    HIGHLIGHT_MARKER.replace_all(text, "").into_owned()
}
