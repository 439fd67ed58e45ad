//! Turning implicit mentions into explicit references, as a preview or as an atomic write.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use crate::{
    codec::{
        highlight, link_token, protected_ranges, rewrite, scan, strip_highlight,
        tag_slug, tag_token, CandidateSet, Occurrence,
    },
    error::LinkGraphError,
    graph::{BodyUpdate, LinkGraphSynchronizer, SyncReport},
    properties::{Entity, EntityId, WorldId},
    store::LinkStore,
};

/// Which kind of explicit reference a suggestion inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionVariant {
    /// `[[id|text]]` tokens; matches titles and aliases.
    #[default]
    Link,
    /// Legacy `#slug` tokens; matches titles only.
    Tag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMode {
    #[default]
    Preview,
    Apply,
}

impl Display for SuggestionVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionVariant::Link => write!(f, "link"),
            SuggestionVariant::Tag => write!(f, "tag"),
        }
    }
}

impl FromStr for SuggestionVariant {
    type Err = LinkGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "link" => Ok(SuggestionVariant::Link),
            "tag" => Ok(SuggestionVariant::Tag),
            other => Err(LinkGraphError::Config(format!(
                "unknown suggestion variant '{other}', expected 'link' or 'tag'"
            ))),
        }
    }
}

impl Display for SuggestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionMode::Preview => write!(f, "preview"),
            SuggestionMode::Apply => write!(f, "apply"),
        }
    }
}

impl FromStr for SuggestionMode {
    type Err = LinkGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preview" => Ok(SuggestionMode::Preview),
            "apply" => Ok(SuggestionMode::Apply),
            other => Err(LinkGraphError::Config(format!(
                "unknown suggestion mode '{other}', expected 'preview' or 'apply'"
            ))),
        }
    }
}

/// One matched candidate name and how often it occurred, e.g. "Waterdeep (3×)".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub candidate: EntityId,
    pub title: String,
    /// The text of the first occurrence, as written.
    pub matched_text: String,
    pub count: usize,
    pub is_alias: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub new_text: String,
    pub matches: Vec<MatchSummary>,
    pub applied: usize,
    /// Set when the rewrite was persisted.
    pub sync: Option<SyncReport>,
}

/// A computed suggestion, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Text shown to the user; tag tokens are highlighted.
    pub preview: String,
    /// Text to persist on apply.
    pub persisted: String,
    pub matches: Vec<MatchSummary>,
    pub applied: usize,
}

/// Groups occurrences by (candidate, name), ordered by first appearance.
pub fn summarize(occurrences: &[Occurrence]) -> Vec<MatchSummary> {
    let mut index = BTreeMap::<(EntityId, &str), usize>::new();
    let mut summaries = Vec::<MatchSummary>::new();
    for occ in occurrences.iter() {
        match index.get(&(occ.candidate, occ.matched_name.as_str())) {
            Some(idx) => summaries[*idx].count += 1,
            None => {
                index.insert((occ.candidate, occ.matched_name.as_str()), summaries.len());
                summaries.push(MatchSummary {
                    candidate: occ.candidate,
                    title: occ.title.clone(),
                    matched_text: occ.matched_text.clone(),
                    count: 1,
                    is_alias: occ.is_alias,
                });
            }
        }
    }
    summaries
}

/// Slug per tag candidate. Titles without any slug-able character are skipped, and when two
/// titles share a slug the first entity keeps it.
fn tag_slugs<'a>(corpus: &'a [Entity], exclude: Option<EntityId>) -> Vec<(&'a Entity, String)> {
    let mut taken = BTreeMap::<String, EntityId>::new();
    corpus
        .iter()
        .filter(|e| Some(e.id) != exclude)
        .filter_map(|e| {
            let slug = tag_slug(e.title.as_deref()?)?;
            if taken.contains_key(&slug) {
                return None;
            }
            taken.insert(slug.clone(), e.id);
            Some((e, slug))
        })
        .collect()
}

/// Scans `text` for mentions of the entities in `corpus` (minus `exclude`) and rewrites them
/// into `variant` tokens.
pub fn compute_suggestion(
    text: &str,
    corpus: &[Entity],
    exclude: Option<EntityId>,
    variant: SuggestionVariant,
) -> Result<Suggestion, LinkGraphError> {
    let mut builder = CandidateSet::builder();
    if let Some(id) = exclude {
        builder = builder.exclude(id);
    }

    let slugs = match variant {
        SuggestionVariant::Link => {
            for entity in corpus.iter() {
                builder = builder.entity(entity, true);
            }
            BTreeMap::new()
        }
        SuggestionVariant::Tag => {
            let mut slugs = BTreeMap::new();
            for (entity, slug) in tag_slugs(corpus, exclude) {
                builder = builder.title(entity.id, entity.display_title());
                slugs.insert(entity.id, slug);
            }
            slugs
        }
    };
    let candidates = builder.build()?;
    let mut occurrences = scan(text, &candidates, &protected_ranges(text))?;
    if variant == SuggestionVariant::Tag {
        // `&#slug` would read back as an HTML entity, not a tag.
        occurrences.retain(|occ| !text[..occ.start].ends_with('&'));
    }
    let matches = summarize(&occurrences);

    let (preview, persisted) = match variant {
        SuggestionVariant::Link => {
            let rewritten = rewrite(text, &occurrences, link_token);
            (rewritten.clone(), rewritten)
        }
        SuggestionVariant::Tag => {
            let token = |occ: &Occurrence| {
                tag_token(slugs.get(&occ.candidate).map_or("", String::as_str))
            };
            (
                rewrite(text, &occurrences, |occ| highlight(&token(occ))),
                rewrite(text, &occurrences, token),
            )
        }
    };
    tracing::debug!(
        "[compute_suggestion] {} candidates, {} occurrences, {} applied",
        candidates.len(),
        occurrences.len(),
        persisted.applied
    );

    Ok(Suggestion {
        preview: preview.text,
        persisted: persisted.text,
        matches,
        applied: persisted.applied,
    })
}

/// Outcome for one entity of a world-wide run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub entity: EntityId,
    pub title: String,
    pub applied: usize,
    pub matches: Vec<MatchSummary>,
    pub sync: Option<SyncReport>,
    pub error: Option<LinkGraphError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldReport {
    pub scanned: usize,
    /// Entities with at least one match.
    pub outcomes: Vec<EntityOutcome>,
    pub total_applied: usize,
    pub failed: usize,
}

/// Preview/apply of reference suggestions on stored entities.
#[derive(Debug, Clone)]
pub struct ReferenceSuggestionService<S> {
    synchronizer: LinkGraphSynchronizer<S>,
}

impl<S: LinkStore> ReferenceSuggestionService<S> {
    pub fn new(synchronizer: LinkGraphSynchronizer<S>) -> Self {
        ReferenceSuggestionService { synchronizer }
    }

    pub fn synchronizer(&self) -> &LinkGraphSynchronizer<S> {
        &self.synchronizer
    }

    pub fn store(&self) -> &S {
        self.synchronizer.store()
    }

    async fn load(&self, id: EntityId) -> Result<Entity, LinkGraphError> {
        self.store()
            .entity(id)
            .await?
            .ok_or_else(|| LinkGraphError::NotFound(format!("entity {id}")))
    }

    /// Rewrites mentions of other entities of the same world in `entity_id`'s body. Apply
    /// writes the new body and syncs its edges in one transaction, failing with
    /// [LinkGraphError::StaleSuggestion] if the body changed after it was scanned.
    #[tracing::instrument(skip(self))]
    pub async fn suggest(
        &self,
        entity_id: EntityId,
        variant: SuggestionVariant,
        mode: SuggestionMode,
    ) -> Result<RewriteResult, LinkGraphError> {
        let entity = self.load(entity_id).await?;
        let corpus = self.store().world_entities(entity.world).await?;
        let body = entity.body.clone().unwrap_or_default();
        let suggestion = compute_suggestion(&body, &corpus, Some(entity_id), variant)?;
        self.finish(&entity, suggestion, mode).await
    }

    async fn finish(
        &self,
        entity: &Entity,
        suggestion: Suggestion,
        mode: SuggestionMode,
    ) -> Result<RewriteResult, LinkGraphError> {
        match mode {
            SuggestionMode::Preview => Ok(RewriteResult {
                new_text: suggestion.preview,
                matches: suggestion.matches,
                applied: suggestion.applied,
                sync: None,
            }),
            SuggestionMode::Apply if suggestion.applied == 0 => Ok(RewriteResult {
                new_text: suggestion.persisted,
                matches: suggestion.matches,
                applied: 0,
                sync: Some(SyncReport::default()),
            }),
            SuggestionMode::Apply => {
                let update = BodyUpdate {
                    expected: entity.body.clone(),
                    new: suggestion.persisted.clone(),
                };
                let report = self.synchronizer.apply(entity.id, update).await?;
                tracing::info!(
                    "[ReferenceSuggestionService] applied {} references to {}",
                    suggestion.applied,
                    entity
                );
                Ok(RewriteResult {
                    new_text: suggestion.persisted,
                    matches: suggestion.matches,
                    applied: suggestion.applied,
                    sync: Some(report),
                })
            }
        }
    }

    /// Previews suggestions for unsaved text against `world`. Highlight markers left over from
    /// an earlier tag preview are removed first.
    #[tracing::instrument(skip(self, text))]
    pub async fn suggest_text(
        &self,
        world: WorldId,
        exclude: Option<EntityId>,
        text: &str,
        variant: SuggestionVariant,
    ) -> Result<RewriteResult, LinkGraphError> {
        let corpus = self.store().world_entities(world).await?;
        let text = match variant {
            SuggestionVariant::Tag => strip_highlight(text),
            SuggestionVariant::Link => text.to_string(),
        };
        let suggestion = compute_suggestion(&text, &corpus, exclude, variant)?;
        Ok(RewriteResult {
            new_text: suggestion.preview,
            matches: suggestion.matches,
            applied: suggestion.applied,
            sync: None,
        })
    }

    /// Runs [Self::suggest] over every entity of `world`. A stale body is recorded against its
    /// entity and the run continues; any other error aborts it.
    #[tracing::instrument(skip(self))]
    pub async fn suggest_world(
        &self,
        world: WorldId,
        variant: SuggestionVariant,
        mode: SuggestionMode,
    ) -> Result<WorldReport, LinkGraphError> {
        let corpus = self.store().world_entities(world).await?;
        let mut report = WorldReport {
            scanned: corpus.len(),
            ..WorldReport::default()
        };

        for entity in corpus.iter() {
            let Some(body) = entity.body.as_deref() else {
                continue;
            };
            let suggestion = compute_suggestion(body, &corpus, Some(entity.id), variant)?;
            if suggestion.applied == 0 {
                continue;
            }
            let mut outcome = EntityOutcome {
                entity: entity.id,
                title: entity.display_title().to_string(),
                applied: suggestion.applied,
                matches: suggestion.matches.clone(),
                sync: None,
                error: None,
            };
            match self.finish(entity, suggestion, mode).await {
                Ok(result) => {
                    outcome.sync = result.sync;
                    report.total_applied += result.applied;
                }
                Err(e @ LinkGraphError::StaleSuggestion(_)) => {
                    tracing::warn!("[ReferenceSuggestionService] skipping {}: {}", entity, e);
                    outcome.applied = 0;
                    outcome.error = Some(e);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
            report.outcomes.push(outcome);
        }
        tracing::info!(
            "[ReferenceSuggestionService] {} {} run over {} entities: {} references in {} entities, {} failed",
            variant,
            mode,
            report.scanned,
            report.total_applied,
            report.outcomes.len() - report.failed,
            report.failed
        );
        Ok(report)
    }

    pub async fn apply_world(
        &self,
        world: WorldId,
        variant: SuggestionVariant,
    ) -> Result<WorldReport, LinkGraphError> {
        self.suggest_world(world, variant, SuggestionMode::Apply).await
    }

    pub async fn resync(&self, entity_id: EntityId) -> Result<SyncReport, LinkGraphError> {
        self.synchronizer.resync(entity_id).await
    }
}
