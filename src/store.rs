//! Storage seam for entities and their edges, plus the in-process [MemoryStore].

use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    codec::{snippet, tag_slug},
    error::LinkGraphError,
    graph::{reconcile, BodySource, EdgePlan, EdgeTransaction, SyncReport},
    properties::{
        now_millis, Backlink, Entity, EntityId, OutgoingLink, ReferenceEdge, ResolvedTarget,
        TagEdge, WorldId,
    },
};

/// Characters of context on each side of a link in a backlink snippet.
pub const SNIPPET_RADIUS: usize = 40;

/// Read access to entities and edges, and transactional edge reconciliation.
pub trait LinkStore: Sync {
    fn entity(
        &self,
        id: EntityId,
    ) -> impl Future<Output = Result<Option<Entity>, LinkGraphError>> + Send;

    /// Every entity of `world`, in insertion order.
    fn world_entities(
        &self,
        world: WorldId,
    ) -> impl Future<Output = Result<Vec<Entity>, LinkGraphError>> + Send;

    fn reference_edges(
        &self,
        source: EntityId,
    ) -> impl Future<Output = Result<Vec<ReferenceEdge>, LinkGraphError>> + Send;

    fn tag_edges(
        &self,
        source: EntityId,
    ) -> impl Future<Output = Result<Vec<TagEdge>, LinkGraphError>> + Send;

    /// Incoming edges of `target`, newest first.
    fn backlinks(
        &self,
        target: EntityId,
    ) -> impl Future<Output = Result<Vec<Backlink>, LinkGraphError>> + Send;

    fn resolve(
        &self,
        ids: &[EntityId],
    ) -> impl Future<Output = Result<Vec<ResolvedTarget>, LinkGraphError>> + Send;

    /// Sources in `world` carrying the tag `tag`, newest first. `display_text` is always `None`.
    fn tagged(
        &self,
        world: WorldId,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<Backlink>, LinkGraphError>> + Send;

    /// Runs [reconcile] for `source` atomically: all of its writes commit, or none do.
    fn reconcile(
        &self,
        source: EntityId,
        body: BodySource,
        sync_tags: bool,
    ) -> impl Future<Output = Result<SyncReport, LinkGraphError>> + Send;

    /// Outgoing edges of `source` in document order, flagged with whether the target exists.
    fn outgoing(
        &self,
        source: EntityId,
    ) -> impl Future<Output = Result<Vec<OutgoingLink>, LinkGraphError>> + Send {
        async move {
            let mut edges = self.reference_edges(source).await?;
            edges.sort_by_key(|e| e.position);
            let targets = edges.iter().map(|e| e.target).collect::<Vec<EntityId>>();
            let resolved = self
                .resolve(&targets)
                .await?
                .into_iter()
                .map(|r| (r.id, r))
                .collect::<BTreeMap<EntityId, ResolvedTarget>>();
            Ok(edges
                .into_iter()
                .map(|e| {
                    let target = resolved.get(&e.target);
                    OutgoingLink {
                        target: e.target,
                        target_title: target.and_then(|t| t.title.clone()),
                        display_text: e.display_text,
                        position: e.position,
                        resolved: target.is_some_and(|t| t.exists),
                    }
                })
                .collect())
        }
    }

    /// Legacy tag mentions of `target`: other entities of its world tagged with the slug of its
    /// title. When several titles share a slug, the first entity of the world owns the tag and
    /// the others have no tag mentions.
    fn tag_backlinks(
        &self,
        target: EntityId,
    ) -> impl Future<Output = Result<Vec<Backlink>, LinkGraphError>> + Send {
        async move {
            let entity = self
                .entity(target)
                .await?
                .ok_or_else(|| LinkGraphError::NotFound(format!("entity {target}")))?;
            let Some(slug) = entity.title.as_deref().and_then(tag_slug) else {
                return Ok(Vec::new());
            };
            let owner = self
                .world_entities(entity.world)
                .await?
                .into_iter()
                .find(|e| e.title.as_deref().and_then(tag_slug).as_ref() == Some(&slug))
                .map(|e| e.id);
            if owner != Some(target) {
                tracing::debug!(
                    "[LinkStore.tag_backlinks] tag '{}' of {} belongs to {:?}",
                    slug,
                    target,
                    owner
                );
                return Ok(Vec::new());
            }
            let mut mentions = self.tagged(entity.world, &slug).await?;
            mentions.retain(|m| m.source != target);
            Ok(mentions)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTables {
    entities: Vec<Entity>,
    links: Vec<ReferenceEdge>,
    tags: Vec<TagEdge>,
}

impl MemoryTables {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }
}

struct MemoryTransaction<'a> {
    tables: &'a mut MemoryTables,
}

impl EdgeTransaction for MemoryTransaction<'_> {
    async fn begin_reconcile(&mut self, _source: EntityId) -> Result<(), LinkGraphError> {
        Ok(())
    }

    async fn load_body(&mut self, source: EntityId) -> Result<Option<Option<String>>, LinkGraphError> {
        Ok(self.tables.entity(source).map(|e| e.body.clone()))
    }

    async fn load_links(&mut self, source: EntityId) -> Result<Vec<ReferenceEdge>, LinkGraphError> {
        Ok(self
            .tables
            .links
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect())
    }

    async fn load_tags(&mut self, source: EntityId) -> Result<Vec<TagEdge>, LinkGraphError> {
        Ok(self
            .tables
            .tags
            .iter()
            .filter(|t| t.source == source)
            .cloned()
            .collect())
    }

    async fn write_body(
        &mut self,
        source: EntityId,
        body: &str,
        modified_at: i64,
    ) -> Result<(), LinkGraphError> {
        let entity = self
            .tables
            .entity_mut(source)
            .ok_or_else(|| LinkGraphError::NotFound(format!("entity {source}")))?;
        entity.body = Some(body.to_string());
        entity.modified_at = modified_at;
        Ok(())
    }

    async fn apply_plan(&mut self, source: EntityId, plan: &EdgePlan) -> Result<(), LinkGraphError> {
        let removed = plan.remove_links.iter().map(|e| e.key()).collect::<Vec<_>>();
        self.tables
            .links
            .retain(|e| e.source != source || !removed.contains(&e.key()));
        self.tables
            .tags
            .retain(|t| t.source != source || !plan.remove_tags.iter().any(|r| r.tag == t.tag));

        for moved in plan.reposition_tags.iter() {
            if let Some(row) = self
                .tables
                .tags
                .iter_mut()
                .find(|t| t.source == source && t.tag == moved.tag)
            {
                row.position = moved.position;
            }
        }
        self.tables.links.extend(plan.insert_links.iter().cloned());
        self.tables.tags.extend(plan.insert_tags.iter().cloned());
        Ok(())
    }

    async fn mark_synced(&mut self, source: EntityId, synced_at: i64) -> Result<(), LinkGraphError> {
        if let Some(entity) = self.tables.entity_mut(source) {
            entity.synced_at = Some(synced_at.max(entity.modified_at));
        }
        Ok(())
    }
}

/// In-process store. Cloning shares the underlying tables.
///
/// Each reconcile works on a copy of the tables and swaps it in on success, holding the lock
/// throughout so reconciles never interleave.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTables>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Inserts or replaces an entity. Replacing keeps `synced_at` and moves `modified_at` past
    /// it, so the entity reads as unsynced until the next sync.
    pub fn put_entity(&self, mut entity: Entity) {
        let mut tables = self.inner.lock();
        match tables.entity_mut(entity.id) {
            Some(existing) => {
                entity.synced_at = existing.synced_at;
                entity.modified_at = entity
                    .modified_at
                    .max(existing.synced_at.unwrap_or_default() + 1);
                *existing = entity;
            }
            None => tables.entities.push(entity),
        }
    }

    /// Writes a body outside of any sync, as an editor save would.
    pub fn set_body(&self, id: EntityId, body: &str) -> Result<(), LinkGraphError> {
        let mut tables = self.inner.lock();
        let entity = tables
            .entity_mut(id)
            .ok_or_else(|| LinkGraphError::NotFound(format!("entity {id}")))?;
        entity.body = Some(body.to_string());
        entity.modified_at = now_millis().max(entity.synced_at.unwrap_or_default() + 1);
        Ok(())
    }

    /// Removes an entity along with every edge it sources.
    pub fn delete_entity(&self, id: EntityId) -> bool {
        let mut tables = self.inner.lock();
        let before = tables.entities.len();
        tables.entities.retain(|e| e.id != id);
        tables.links.retain(|e| e.source != id);
        tables.tags.retain(|t| t.source != id);
        tables.entities.len() != before
    }

    /// Makes the next reconcile fail at commit time with a storage error, leaving the tables
    /// as they were.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl LinkStore for MemoryStore {
    async fn entity(&self, id: EntityId) -> Result<Option<Entity>, LinkGraphError> {
        Ok(self.inner.lock().entity(id).cloned())
    }

    async fn world_entities(&self, world: WorldId) -> Result<Vec<Entity>, LinkGraphError> {
        Ok(self
            .inner
            .lock()
            .entities
            .iter()
            .filter(|e| e.world == world)
            .cloned()
            .collect())
    }

    async fn reference_edges(&self, source: EntityId) -> Result<Vec<ReferenceEdge>, LinkGraphError> {
        let mut edges = self
            .inner
            .lock()
            .links
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect::<Vec<ReferenceEdge>>();
        edges.sort_by_key(|e| e.position);
        Ok(edges)
    }

    async fn tag_edges(&self, source: EntityId) -> Result<Vec<TagEdge>, LinkGraphError> {
        let mut tags = self
            .inner
            .lock()
            .tags
            .iter()
            .filter(|t| t.source == source)
            .cloned()
            .collect::<Vec<TagEdge>>();
        tags.sort_by_key(|t| t.position);
        Ok(tags)
    }

    async fn backlinks(&self, target: EntityId) -> Result<Vec<Backlink>, LinkGraphError> {
        let tables = self.inner.lock();
        let mut backlinks = tables
            .links
            .iter()
            .filter(|e| e.target == target)
            .map(|e| {
                let source = tables.entity(e.source);
                Backlink {
                    source: e.source,
                    source_title: source.map(|s| s.display_title().to_string()).unwrap_or_default(),
                    display_text: e.display_text.clone(),
                    position: e.position,
                    snippet: source
                        .and_then(|s| s.body.as_deref())
                        .map(|body| snippet(body, e.position, SNIPPET_RADIUS)),
                    created_at: e.created_at,
                }
            })
            .collect::<Vec<Backlink>>();
        backlinks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.source.cmp(&b.source))
                .then(a.position.cmp(&b.position))
        });
        Ok(backlinks)
    }

    async fn tagged(&self, world: WorldId, tag: &str) -> Result<Vec<Backlink>, LinkGraphError> {
        let tables = self.inner.lock();
        let mut mentions = tables
            .tags
            .iter()
            .filter(|t| t.tag == tag)
            .filter_map(|t| {
                let source = tables.entity(t.source).filter(|s| s.world == world)?;
                Some(Backlink {
                    source: t.source,
                    source_title: source.display_title().to_string(),
                    display_text: None,
                    position: t.position,
                    snippet: source
                        .body
                        .as_deref()
                        .map(|body| snippet(body, t.position, SNIPPET_RADIUS)),
                    created_at: t.created_at,
                })
            })
            .collect::<Vec<Backlink>>();
        mentions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.source.cmp(&b.source)));
        Ok(mentions)
    }

    async fn resolve(&self, ids: &[EntityId]) -> Result<Vec<ResolvedTarget>, LinkGraphError> {
        let tables = self.inner.lock();
        Ok(ids
            .iter()
            .map(|id| {
                let entity = tables.entity(*id);
                ResolvedTarget {
                    id: *id,
                    exists: entity.is_some(),
                    title: entity.and_then(|e| e.title.clone()),
                }
            })
            .collect())
    }

    async fn reconcile(
        &self,
        source: EntityId,
        body: BodySource,
        sync_tags: bool,
    ) -> Result<SyncReport, LinkGraphError> {
        let mut tables = self.inner.lock_arc();
        let mut working = tables.clone();
        let report = {
            let mut tx = MemoryTransaction {
                tables: &mut working,
            };
            reconcile(&mut tx, source, body, sync_tags).await?
        };
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            tracing::error!("[MemoryStore.reconcile] injected commit failure for {}", source);
            return Err(LinkGraphError::Storage(format!(
                "commit of reconcile for {source} failed"
            )));
        }
        *tables = working;
        Ok(report)
    }
}
