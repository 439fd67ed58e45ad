//! Reconciliation of persisted reference edges with the references present in a body.
//!
//! The diff itself ([plan_sync]) is pure. [reconcile] drives it against any store that can hand
//! out an [EdgeTransaction], and [LinkGraphSynchronizer] is the public entry point.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
};

use crate::{
    codec::{parse_references, ParsedReference, ReferenceKind},
    error::LinkGraphError,
    properties::{now_millis, EntityId, ReferenceEdge, ReferenceKey, TagEdge},
    store::LinkStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReport {
    pub removed: usize,
    pub added: usize,
    pub repositioned: usize,
}

/// Counts of edge changes made by one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub removed: usize,
    pub added: usize,
    pub tags: TagReport,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == SyncReport::default()
    }
}

/// The edge writes needed to bring one source up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgePlan {
    pub remove_links: Vec<ReferenceEdge>,
    pub insert_links: Vec<ReferenceEdge>,
    pub remove_tags: Vec<TagEdge>,
    pub insert_tags: Vec<TagEdge>,
    /// Surviving tag rows carrying their new position and original `created_at`.
    pub reposition_tags: Vec<TagEdge>,
}

impl EdgePlan {
    pub fn is_empty(&self) -> bool {
        self.remove_links.is_empty()
            && self.insert_links.is_empty()
            && self.remove_tags.is_empty()
            && self.insert_tags.is_empty()
            && self.reposition_tags.is_empty()
    }

    pub fn report(&self) -> SyncReport {
        SyncReport {
            removed: self.remove_links.len(),
            added: self.insert_links.len(),
            tags: TagReport {
                removed: self.remove_tags.len(),
                added: self.insert_tags.len(),
                repositioned: self.reposition_tags.len(),
            },
        }
    }
}

/// Diffs the references parsed from `source`'s body against its persisted edges.
///
/// Links are compared by `(target, position, display)`; tags by name, with the first occurrence
/// supplying the position. When `sync_tags` is false existing tag rows are left alone.
pub fn plan_sync(
    source: EntityId,
    parsed: &[ParsedReference],
    existing_links: &[ReferenceEdge],
    existing_tags: &[TagEdge],
    now: i64,
    sync_tags: bool,
) -> EdgePlan {
    let mut plan = EdgePlan::default();

    let mut desired_links = BTreeMap::<ReferenceKey, ReferenceEdge>::new();
    let mut desired_tags = BTreeMap::<&str, usize>::new();
    for reference in parsed.iter() {
        match &reference.kind {
            ReferenceKind::Link { target, display } => {
                let edge = ReferenceEdge {
                    source,
                    target: *target,
                    display_text: display.clone(),
                    position: reference.position,
                    created_at: now,
                };
                desired_links.entry(edge.key()).or_insert(edge);
            }
            ReferenceKind::Tag { name } => {
                desired_tags.entry(name.as_str()).or_insert(reference.position);
            }
        }
    }

    let existing_keys = existing_links
        .iter()
        .map(|e| e.key())
        .collect::<BTreeSet<ReferenceKey>>();
    plan.remove_links = existing_links
        .iter()
        .filter(|e| !desired_links.contains_key(&e.key()))
        .cloned()
        .collect();
    plan.insert_links = desired_links
        .into_iter()
        .filter(|(key, _)| !existing_keys.contains(key))
        .map(|(_, edge)| edge)
        .collect();
    plan.insert_links.sort_by_key(|e| e.position);

    if !sync_tags {
        return plan;
    }

    let mut seen = BTreeSet::new();
    for existing in existing_tags.iter() {
        if !seen.insert(existing.tag.as_str()) {
            continue;
        }
        match desired_tags.get(existing.tag.as_str()) {
            None => plan.remove_tags.push(existing.clone()),
            Some(position) if *position != existing.position => {
                plan.reposition_tags.push(TagEdge {
                    position: *position,
                    ..existing.clone()
                });
            }
            Some(_) => {}
        }
    }
    let mut insert_tags = desired_tags
        .into_iter()
        .filter(|(name, _)| !seen.contains(name))
        .map(|(name, position)| TagEdge {
            source,
            tag: name.to_string(),
            position,
            created_at: now,
        })
        .collect::<Vec<TagEdge>>();
    insert_tags.sort_by_key(|t| t.position);
    plan.insert_tags = insert_tags;
    plan
}

/// A body swap computed against `expected`; refused if the stored body has moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyUpdate {
    pub expected: Option<String>,
    pub new: String,
}

/// Where [reconcile] takes the text to parse from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    /// Caller-supplied text. The entity is stamped synced only if it equals the stored body.
    Given(Option<String>),
    /// The body as currently stored.
    Stored,
    /// Write `new` first, provided the stored body still equals `expected`.
    Replace(BodyUpdate),
}

/// The store operations [reconcile] needs, all within one transaction.
///
/// Implementations provide atomicity: the caller commits only when [reconcile] returns `Ok`.
pub trait EdgeTransaction: Send {
    /// First statement of the transaction; serializes concurrent reconciles of `source`.
    fn begin_reconcile(
        &mut self,
        source: EntityId,
    ) -> impl Future<Output = Result<(), LinkGraphError>> + Send;

    /// `None` if the entity does not exist, `Some(None)` if it has no body.
    fn load_body(
        &mut self,
        source: EntityId,
    ) -> impl Future<Output = Result<Option<Option<String>>, LinkGraphError>> + Send;

    fn load_links(
        &mut self,
        source: EntityId,
    ) -> impl Future<Output = Result<Vec<ReferenceEdge>, LinkGraphError>> + Send;

    fn load_tags(
        &mut self,
        source: EntityId,
    ) -> impl Future<Output = Result<Vec<TagEdge>, LinkGraphError>> + Send;

    fn write_body(
        &mut self,
        source: EntityId,
        body: &str,
        modified_at: i64,
    ) -> impl Future<Output = Result<(), LinkGraphError>> + Send;

    /// Deletes run before inserts so a position can be reused within one plan.
    fn apply_plan(
        &mut self,
        source: EntityId,
        plan: &EdgePlan,
    ) -> impl Future<Output = Result<(), LinkGraphError>> + Send;

    fn mark_synced(
        &mut self,
        source: EntityId,
        synced_at: i64,
    ) -> impl Future<Output = Result<(), LinkGraphError>> + Send;
}

/// Runs one full sync of `source` inside `tx`.
pub async fn reconcile<T: EdgeTransaction>(
    tx: &mut T,
    source: EntityId,
    body: BodySource,
    sync_tags: bool,
) -> Result<SyncReport, LinkGraphError> {
    tx.begin_reconcile(source).await?;
    let now = now_millis();
    let stored = tx
        .load_body(source)
        .await?
        .ok_or_else(|| LinkGraphError::NotFound(format!("entity {source}")))?;

    let (text, stamp) = match body {
        BodySource::Given(text) => {
            let matches_stored = text == stored;
            (text, matches_stored)
        }
        BodySource::Stored => (stored, true),
        BodySource::Replace(update) => {
            if stored != update.expected {
                tracing::warn!(
                    "[reconcile] body of {} changed since it was scanned; refusing update",
                    source
                );
                return Err(LinkGraphError::StaleSuggestion(source));
            }
            tx.write_body(source, &update.new, now).await?;
            (Some(update.new), true)
        }
    };

    let parsed = parse_references(text.as_deref());
    let links = tx.load_links(source).await?;
    let tags = match sync_tags {
        true => tx.load_tags(source).await?,
        false => Vec::new(),
    };
    let plan = plan_sync(source, &parsed, &links, &tags, now, sync_tags);
    if !plan.is_empty() {
        tx.apply_plan(source, &plan).await?;
    }
    if stamp {
        tx.mark_synced(source, now).await?;
    }
    Ok(plan.report())
}

/// Keeps the edges of a store consistent with entity bodies.
#[derive(Debug, Clone)]
pub struct LinkGraphSynchronizer<S> {
    store: S,
    sync_tags: bool,
}

impl<S: LinkStore> LinkGraphSynchronizer<S> {
    pub fn new(store: S) -> Self {
        LinkGraphSynchronizer {
            store,
            sync_tags: true,
        }
    }

    /// Leaves tag edges untouched on every sync.
    pub fn without_tags(mut self) -> Self {
        self.sync_tags = false;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn syncs_tags(&self) -> bool {
        self.sync_tags
    }

    /// Reconciles the edges of `source` with the references in `text`.
    #[tracing::instrument(skip(self, text))]
    pub async fn sync(
        &self,
        source: EntityId,
        text: Option<&str>,
    ) -> Result<SyncReport, LinkGraphError> {
        let body = BodySource::Given(text.map(str::to_string));
        self.run(source, body).await
    }

    /// Re-derives the edges of `source` from its stored body.
    #[tracing::instrument(skip(self))]
    pub async fn resync(&self, source: EntityId) -> Result<SyncReport, LinkGraphError> {
        self.run(source, BodySource::Stored).await
    }

    /// Writes a new body and reconciles its edges atomically.
    #[tracing::instrument(skip(self, update))]
    pub async fn apply(
        &self,
        source: EntityId,
        update: BodyUpdate,
    ) -> Result<SyncReport, LinkGraphError> {
        self.run(source, BodySource::Replace(update)).await
    }

    async fn run(&self, source: EntityId, body: BodySource) -> Result<SyncReport, LinkGraphError> {
        let report = self.store.reconcile(source, body, self.sync_tags).await?;
        if !report.is_empty() {
            tracing::info!(
                "[LinkGraphSynchronizer] {}: -{} +{} links, tags -{} +{} ~{}",
                source,
                report.removed,
                report.added,
                report.tags.removed,
                report.tags.added,
                report.tags.repositioned
            );
        }
        Ok(report)
    }
}
