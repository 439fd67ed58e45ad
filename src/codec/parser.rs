//! Extraction of explicit reference tokens.
//!
//! Three grammars share the same text:
//!
//! - **bracket links**: `[[<id>]]` or `[[<id>|<display>]]`, where `<id>` must be a canonical
//!   8-4-4-4-12 hex identifier. Bracket syntax around anything else is tokenized (so it stays
//!   protected from rewriting) but yields no reference.
//! - **link elements**: the rich-text editor's `<span ... data-target-id="<id>">text</span>`.
//!   The inner text is the display text; the id follows the same rule as bracket links.
//! - **hash tags**: `#` followed by word characters, e.g. `#waterdeep` or `#waterdeep-harbor`.
//!   A hash is ignored inside inline code, right after a backtick, right after a word character
//!   (`C#`, `page#anchor`), as part of an HTML entity (`&#39;`) or inside a link token.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{
    codec::{is_word_char, CharOffsets},
    properties::EntityId,
};

static BRACKET_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[([^\[\]|]*)(?:\|([^\]]*))?\]\]").expect("bracket token pattern is valid")
});

static CANONICAL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    )
    .expect("canonical id pattern is valid")
});

static ELEMENT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span[^>]+data-target-id="([^"]*)"[^>]*>([^<]*)</span>"#)
        .expect("link element pattern is valid")
});

static HASH_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(\w+(?:-\w+)*)").expect("hash token pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Raw bracket syntax; `id` has not been validated.
    Bracket {
        id: &'a str,
        display: Option<&'a str>,
    },
    /// Rich-text link element; `id` has not been validated.
    Element {
        id: &'a str,
        display: &'a str,
    },
    Hash {
        name: &'a str,
    },
}

/// A syntactic token and its byte span, before any validity checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub span: Range<usize>,
    pub kind: TokenKind<'a>,
}

/// Every bracket, element and hash token in `text`, in document order. Hash tokens nested
/// inside a link token are not reported separately.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = BRACKET_TOKEN
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let id = cap.get(1)?.as_str();
            Some(Token {
                span: whole.range(),
                kind: TokenKind::Bracket {
                    id,
                    display: cap.get(2).map(|m| m.as_str()),
                },
            })
        })
        .collect::<Vec<Token>>();

    let mut elements = ELEMENT_TOKEN
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some(Token {
                span: whole.range(),
                kind: TokenKind::Element {
                    id: cap.get(1)?.as_str(),
                    display: cap.get(2)?.as_str(),
                },
            })
        })
        .collect::<Vec<Token>>();
    tokens.append(&mut elements);

    let link_spans = tokens
        .iter()
        .map(|t| t.span.clone())
        .collect::<Vec<Range<usize>>>();
    let mut hashes = HASH_TOKEN
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let inside_link = link_spans
                .iter()
                .any(|span| span.start <= whole.start() && whole.end() <= span.end);
            if inside_link {
                return None;
            }
            Some(Token {
                span: whole.range(),
                kind: TokenKind::Hash {
                    name: cap.get(1)?.as_str(),
                },
            })
        })
        .collect::<Vec<Token>>();

    tokens.append(&mut hashes);
    tokens.sort_by_key(|t| t.span.start);
    tokens
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Link {
        target: EntityId,
        display: Option<String>,
    },
    /// Lowercase-normalized tag name.
    Tag { name: String },
}

/// An explicit reference found in a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReference {
    pub kind: ReferenceKind,
    /// Character offset of the first delimiter of the token.
    pub position: usize,
    /// Byte range of the whole token, delimiters included.
    pub span: Range<usize>,
}

impl ParsedReference {
    pub fn link_target(&self) -> Option<EntityId> {
        match &self.kind {
            ReferenceKind::Link { target, .. } => Some(*target),
            ReferenceKind::Tag { .. } => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        match &self.kind {
            ReferenceKind::Tag { name } => Some(name),
            ReferenceKind::Link { .. } => None,
        }
    }
}

/// Whether a hash token starting at byte `start` counts as a tag. `backticks_before` is the
/// number of backticks in `text[..start]`.
fn is_live_hash(text: &str, start: usize, backticks_before: usize) -> bool {
    if backticks_before % 2 == 1 {
        return false;
    }
    match text[..start].chars().next_back() {
        Some('`') | Some('&') => false,
        Some(c) if is_word_char(c) => false,
        _ => true,
    }
}

fn link_target(id: &str, at: usize) -> Option<EntityId> {
    let id = id.trim();
    if !CANONICAL_ID.is_match(id) {
        tracing::debug!(
            "[parse_references] skipping link token with malformed id '{}' at byte {}",
            id,
            at
        );
        return None;
    }
    match EntityId::try_from(id) {
        Ok(target) => Some(target),
        Err(e) => {
            tracing::debug!("[parse_references] unparseable id '{}': {}", id, e);
            None
        }
    }
}

fn display_text(display: Option<&str>) -> Option<String> {
    display
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Extracts every explicit reference in `text`, in document order.
///
/// Absent or empty input yields an empty list. Malformed tokens are skipped, never reported as
/// errors.
pub fn parse_references(text: Option<&str>) -> Vec<ParsedReference> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Vec::new();
    };
    if !text.contains("[[") && !text.contains('#') && !text.contains("data-target-id=") {
        return Vec::new();
    }

    let mut offsets = CharOffsets::new(text);
    let mut backticks = 0;
    let mut counted_to = 0;
    let mut references = Vec::new();

    for token in tokenize(text) {
        let kind = match token.kind {
            TokenKind::Bracket { id, display } => {
                let Some(target) = link_target(id, token.span.start) else {
                    continue;
                };
                ReferenceKind::Link {
                    target,
                    display: display_text(display),
                }
            }
            TokenKind::Element { id, display } => {
                let Some(target) = link_target(id, token.span.start) else {
                    continue;
                };
                ReferenceKind::Link {
                    target,
                    display: display_text(Some(display)),
                }
            }
            TokenKind::Hash { name } => {
                backticks += text[counted_to..token.span.start].matches('`').count();
                counted_to = token.span.start;
                if !is_live_hash(text, token.span.start, backticks) {
                    continue;
                }
                ReferenceKind::Tag {
                    name: name.to_lowercase(),
                }
            }
        };
        references.push(ParsedReference {
            kind,
            position: offsets.char_offset(token.span.start),
            span: token.span,
        });
    }
    references
}
