//! Implicit mention detection: finds plain-text occurrences of known names.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::{cmp::Reverse, collections::BTreeSet};

use crate::{
    codec::{is_word_char, ProtectedRanges, MAX_CANDIDATE_NAMES, MAX_SCAN_BYTES, MIN_NAME_CHARS},
    error::LinkGraphError,
    properties::{Entity, EntityId},
};

/// One matchable name of a candidate entity.
#[derive(Debug, Clone)]
pub struct CandidateName {
    pub candidate: EntityId,
    /// Canonical title of the candidate, reported alongside alias matches.
    pub title: String,
    pub name: String,
    pub is_alias: bool,
    matcher: Regex,
}

/// Immutable, per-request set of names to look for, ordered longest first.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    names: Vec<CandidateName>,
    excluded: Option<EntityId>,
}

impl CandidateSet {
    pub fn builder() -> CandidateSetBuilder {
        CandidateSetBuilder::default()
    }

    /// Names in matching order.
    pub fn names(&self) -> &[CandidateName] {
        &self.names
    }

    pub fn excluded(&self) -> Option<EntityId> {
        self.excluded
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PendingName {
    candidate: EntityId,
    title: String,
    name: String,
    is_alias: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSetBuilder {
    excluded: Option<EntityId>,
    pending: Vec<PendingName>,
}

impl CandidateSetBuilder {
    /// Names registered for `id` are dropped at build time, whenever they were added.
    pub fn exclude(mut self, id: EntityId) -> Self {
        self.excluded = Some(id);
        self
    }

    pub fn title(mut self, id: EntityId, title: &str) -> Self {
        self.pending.push(PendingName {
            candidate: id,
            title: title.trim().to_string(),
            name: title.trim().to_string(),
            is_alias: false,
        });
        self
    }

    pub fn alias(mut self, id: EntityId, title: &str, alias: &str) -> Self {
        self.pending.push(PendingName {
            candidate: id,
            title: title.trim().to_string(),
            name: alias.trim().to_string(),
            is_alias: true,
        });
        self
    }

    /// Registers an entity's title, followed by its aliases when `with_aliases` is set.
    /// Untitled entities contribute nothing.
    pub fn entity(mut self, entity: &Entity, with_aliases: bool) -> Self {
        let Some(title) = entity.title.as_deref() else {
            return self;
        };
        self = self.title(entity.id, title);
        if with_aliases {
            for alias in entity.aliases.iter() {
                self = self.alias(entity.id, title, alias);
            }
        }
        self
    }

    pub fn build(self) -> Result<CandidateSet, LinkGraphError> {
        let mut seen = BTreeSet::new();
        let mut pending = self
            .pending
            .into_iter()
            .filter(|p| Some(p.candidate) != self.excluded)
            .filter(|p| p.name.chars().count() >= MIN_NAME_CHARS)
            .filter(|p| seen.insert((p.candidate, p.name.to_lowercase())))
            .collect::<Vec<PendingName>>();

        if pending.len() > MAX_CANDIDATE_NAMES {
            return Err(LinkGraphError::InputTooLarge {
                what: "candidate set".to_string(),
                size: pending.len(),
                limit: MAX_CANDIDATE_NAMES,
            });
        }

        // Stable: equal lengths keep insertion order, which puts a title ahead of its aliases.
        pending.sort_by_key(|p| Reverse(p.name.chars().count()));

        let mut names = Vec::with_capacity(pending.len());
        for p in pending {
            let matcher = RegexBuilder::new(&regex::escape(&p.name))
                .case_insensitive(true)
                .build()?;
            names.push(CandidateName {
                candidate: p.candidate,
                title: p.title,
                name: p.name,
                is_alias: p.is_alias,
                matcher,
            });
        }
        Ok(CandidateSet {
            names,
            excluded: self.excluded,
        })
    }
}

/// A plain-text mention of a candidate name. Offsets are bytes into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: usize,
    pub length: usize,
    /// The text as written, which may differ in case from the name.
    pub matched_text: String,
    pub candidate: EntityId,
    pub title: String,
    pub matched_name: String,
    pub is_alias: bool,
}

impl Occurrence {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

fn on_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Finds every whole-word, case-insensitive occurrence of a candidate name outside `protected`.
///
/// Names are tried longest first; a match that overlaps a protected range or a span already
/// claimed by a longer name is discarded. The result is sorted by start and never overlaps.
pub fn scan(
    text: &str,
    candidates: &CandidateSet,
    protected: &ProtectedRanges,
) -> Result<Vec<Occurrence>, LinkGraphError> {
    if text.len() > MAX_SCAN_BYTES {
        return Err(LinkGraphError::InputTooLarge {
            what: "text".to_string(),
            size: text.len(),
            limit: MAX_SCAN_BYTES,
        });
    }
    if text.is_empty() || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut claimed = protected.clone();
    let mut occurrences = Vec::new();
    let mut rejected = 0usize;

    for name in candidates.names() {
        let mut from = 0;
        while let Some(m) = name.matcher.find_at(text, from) {
            if !on_word_boundaries(text, m.start(), m.end()) || claimed.overlaps(m.start(), m.end())
            {
                rejected += 1;
                from = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
                continue;
            }
            claimed.insert(m.range());
            occurrences.push(Occurrence {
                start: m.start(),
                length: m.len(),
                matched_text: m.as_str().to_string(),
                candidate: name.candidate,
                title: name.title.clone(),
                matched_name: name.name.clone(),
                is_alias: name.is_alias,
            });
            from = m.end();
        }
    }

    occurrences.sort_by_key(|o| o.start);
    tracing::debug!(
        "[scan] {} names over {} bytes: {} occurrences, {} rejected matches",
        candidates.len(),
        text.len(),
        occurrences.len(),
        rejected
    );
    Ok(occurrences)
}
