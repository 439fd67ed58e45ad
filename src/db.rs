use futures_core::future::BoxFuture;
use sqlx::{
    error::BoxDynError,
    migrate::{Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    pool::PoolOptions,
    sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Pool, QueryBuilder, Row,
};
use std::{collections::BTreeMap, path::Path, result::Result, str::FromStr, time::Duration};

use crate::{
    codec::snippet,
    error::LinkGraphError,
    graph::{reconcile, BodySource, EdgePlan, EdgeTransaction, SyncReport},
    properties::{
        now_millis, Backlink, Entity, EntityId, ReferenceEdge, ResolvedTarget, TagEdge, WorldId,
    },
    store::{LinkStore, SNIPPET_RADIUS},
};

pub const DEFAULT_DB_FILE: &str = "lorelink.db";

/// <https://www.sqlite.org/limits.html#max_variable_number>
pub const SQLITE_LIMIT_VARIABLE_NUMBER: usize = 32766;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Edge writes for one source, batched into as few round trips as the bind limit allows.
struct StagedEdges<'a> {
    qb: QueryBuilder<'a, Sqlite>,
    staged: usize,
    binds: usize,
}

impl<'a> StagedEdges<'a> {
    fn new() -> StagedEdges<'a> {
        StagedEdges {
            qb: QueryBuilder::<Sqlite>::new(""),
            staged: 0,
            binds: 0,
        }
    }

    async fn flush(&mut self, conn: &mut SqliteConnection) -> Result<(), LinkGraphError> {
        if self.staged == 0 {
            return Ok(());
        }
        let staged = self.staged;
        self.qb.build().execute(&mut *conn).await.map_err(|e| {
            tracing::error!(
                "[StagedEdges.flush] SQL error executing {} staged statements\n\terror: {}",
                staged,
                e
            );
            e
        })?;
        self.qb.reset();
        self.staged = 0;
        self.binds = 0;
        Ok(())
    }

    /// Flushes first if `binds` more parameters would overflow SQLite's limit.
    async fn reserve(
        &mut self,
        conn: &mut SqliteConnection,
        binds: usize,
    ) -> Result<(), LinkGraphError> {
        if self.binds + binds > SQLITE_LIMIT_VARIABLE_NUMBER {
            self.flush(conn).await?;
        }
        self.binds += binds;
        self.staged += 1;
        Ok(())
    }

    async fn remove_link(
        &mut self,
        conn: &mut SqliteConnection,
        edge: &ReferenceEdge,
    ) -> Result<(), LinkGraphError> {
        self.reserve(conn, 3).await?;
        self.qb.push("DELETE FROM reference_edges WHERE source = ");
        self.qb.push_bind::<String>(edge.source.into());
        self.qb.push(" AND target = ");
        self.qb.push_bind::<String>(edge.target.into());
        self.qb.push(" AND position = ");
        self.qb.push_bind(edge.position as i64);
        self.qb.push("; ");
        Ok(())
    }

    async fn insert_link(
        &mut self,
        conn: &mut SqliteConnection,
        edge: &ReferenceEdge,
    ) -> Result<(), LinkGraphError> {
        self.reserve(conn, 5).await?;
        self.qb.push(
            "INSERT INTO reference_edges (source, target, display_text, position, created_at) ",
        );
        self.qb.push_values(vec![edge], |mut b, edge| {
            b.push_bind::<String>(edge.source.into())
                .push_bind::<String>(edge.target.into())
                .push_bind::<Option<String>>(edge.display_text.clone())
                .push_bind(edge.position as i64)
                .push_bind(edge.created_at);
        });
        self.qb.push("; ");
        Ok(())
    }

    async fn remove_tag(
        &mut self,
        conn: &mut SqliteConnection,
        tag: &TagEdge,
    ) -> Result<(), LinkGraphError> {
        self.reserve(conn, 2).await?;
        self.qb.push("DELETE FROM tag_edges WHERE source = ");
        self.qb.push_bind::<String>(tag.source.into());
        self.qb.push(" AND tag = ");
        self.qb.push_bind(tag.tag.clone());
        self.qb.push("; ");
        Ok(())
    }

    async fn insert_tag(
        &mut self,
        conn: &mut SqliteConnection,
        tag: &TagEdge,
    ) -> Result<(), LinkGraphError> {
        self.reserve(conn, 4).await?;
        self.qb
            .push("INSERT INTO tag_edges (source, tag, position, created_at) ");
        self.qb.push_values(vec![tag], |mut b, tag| {
            b.push_bind::<String>(tag.source.into())
                .push_bind(tag.tag.clone())
                .push_bind(tag.position as i64)
                .push_bind(tag.created_at);
        });
        self.qb.push("; ");
        Ok(())
    }

    async fn reposition_tag(
        &mut self,
        conn: &mut SqliteConnection,
        tag: &TagEdge,
    ) -> Result<(), LinkGraphError> {
        self.reserve(conn, 3).await?;
        self.qb.push("UPDATE tag_edges SET position = ");
        self.qb.push_bind(tag.position as i64);
        self.qb.push(" WHERE source = ");
        self.qb.push_bind::<String>(tag.source.into());
        self.qb.push(" AND tag = ");
        self.qb.push_bind(tag.tag.clone());
        self.qb.push("; ");
        Ok(())
    }
}

/// One open SQLite transaction driving [reconcile].
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl EdgeTransaction for SqliteTransaction {
    async fn begin_reconcile(&mut self, source: EntityId) -> Result<(), LinkGraphError> {
        // A write as the first statement takes the database write lock for the whole reconcile.
        sqlx::query(
            "INSERT INTO sync_log (source, attempted_at) VALUES (?, ?) \
             ON CONFLICT(source) DO UPDATE SET attempted_at = excluded.attempted_at",
        )
        .bind(source.to_string())
        .bind(now_millis())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            tracing::error!(
                "[SqliteTransaction.begin_reconcile] could not take write lock for {}\n\terror: {}",
                source,
                e
            );
            e
        })?;
        Ok(())
    }

    async fn load_body(&mut self, source: EntityId) -> Result<Option<Option<String>>, LinkGraphError> {
        let row = sqlx::query_as::<_, (Option<String>,)>("SELECT body FROM entities WHERE id = ?")
            .bind(source.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|(body,)| body))
    }

    async fn load_links(&mut self, source: EntityId) -> Result<Vec<ReferenceEdge>, LinkGraphError> {
        Ok(sqlx::query_as::<_, ReferenceEdge>(
            "SELECT * FROM reference_edges WHERE source = ? ORDER BY position",
        )
        .bind(source.to_string())
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn load_tags(&mut self, source: EntityId) -> Result<Vec<TagEdge>, LinkGraphError> {
        Ok(
            sqlx::query_as::<_, TagEdge>("SELECT * FROM tag_edges WHERE source = ? ORDER BY position")
                .bind(source.to_string())
                .fetch_all(&mut *self.tx)
                .await?,
        )
    }

    async fn write_body(
        &mut self,
        source: EntityId,
        body: &str,
        modified_at: i64,
    ) -> Result<(), LinkGraphError> {
        sqlx::query("UPDATE entities SET body = ?, modified_at = ? WHERE id = ?")
            .bind(body)
            .bind(modified_at)
            .bind(source.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn apply_plan(&mut self, _source: EntityId, plan: &EdgePlan) -> Result<(), LinkGraphError> {
        let conn = &mut *self.tx;
        let mut staged = StagedEdges::new();
        for edge in plan.remove_links.iter() {
            staged.remove_link(conn, edge).await?;
        }
        for tag in plan.remove_tags.iter() {
            staged.remove_tag(conn, tag).await?;
        }
        for tag in plan.reposition_tags.iter() {
            staged.reposition_tag(conn, tag).await?;
        }
        for edge in plan.insert_links.iter() {
            staged.insert_link(conn, edge).await?;
        }
        for tag in plan.insert_tags.iter() {
            staged.insert_tag(conn, tag).await?;
        }
        staged.flush(conn).await
    }

    async fn mark_synced(&mut self, source: EntityId, synced_at: i64) -> Result<(), LinkGraphError> {
        sqlx::query("UPDATE entities SET synced_at = MAX(?, modified_at) WHERE id = ?")
            .bind(synced_at)
            .bind(source.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DbConnection(pub Pool<Sqlite>);

/// The SQLite-backed [LinkStore].
pub type SqliteStore = DbConnection;

impl DbConnection {
    async fn attach_aliases(&self, entities: &mut [Entity]) -> Result<(), LinkGraphError> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut aliases = BTreeMap::<EntityId, Vec<String>>::new();
        for chunk in entities.chunks(SQLITE_LIMIT_VARIABLE_NUMBER) {
            let mut qb =
                QueryBuilder::<Sqlite>::new("SELECT entity, alias FROM entity_aliases WHERE entity IN (");
            let mut ids = qb.separated(", ");
            for entity in chunk.iter() {
                ids.push_bind::<String>(entity.id.into());
            }
            qb.push(") ORDER BY entity, ordering");
            let rows = qb
                .build_query_as::<(String, String)>()
                .fetch_all(&self.0)
                .await?;
            for (entity, alias) in rows {
                aliases
                    .entry(EntityId::try_from(entity.as_str())?)
                    .or_default()
                    .push(alias);
            }
        }
        for entity in entities.iter_mut() {
            if let Some(found) = aliases.remove(&entity.id) {
                entity.aliases = found;
            }
        }
        Ok(())
    }

    /// Inserts or updates an entity and its aliases. An update keeps `synced_at` and always
    /// leaves the entity unsynced.
    #[tracing::instrument(skip(self, entity), fields(id = %entity.id))]
    pub async fn put_entity(&self, entity: &Entity) -> Result<(), LinkGraphError> {
        let mut tx = self.0.begin().await?;
        sqlx::query(
            "INSERT INTO entities (id, world, title, body, modified_at, synced_at) \
             VALUES (?, ?, ?, ?, ?, NULL) \
             ON CONFLICT(id) DO UPDATE SET world = excluded.world, title = excluded.title, \
             body = excluded.body, \
             modified_at = MAX(excluded.modified_at, COALESCE(entities.synced_at + 1, 0))",
        )
        .bind(entity.id.to_string())
        .bind(entity.world.to_string())
        .bind(entity.title.clone())
        .bind(entity.body.clone())
        .bind(entity.modified_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("[DbConnection.put_entity] SQL error: {}", e);
            e
        })?;

        sqlx::query("DELETE FROM entity_aliases WHERE entity = ?")
            .bind(entity.id.to_string())
            .execute(&mut *tx)
            .await?;
        if !entity.aliases.is_empty() {
            let mut qb =
                QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO entity_aliases (entity, alias, ordering) ");
            qb.push_values(entity.aliases.iter().enumerate(), |mut b, (idx, alias)| {
                b.push_bind::<String>(entity.id.into())
                    .push_bind(alias.clone())
                    .push_bind(idx as i64);
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes an entity with its aliases and every edge it sources. Returns false if it did
    /// not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete_entity(&self, id: EntityId) -> Result<bool, LinkGraphError> {
        let mut tx = self.0.begin().await?;
        let id_str = id.to_string();
        for table_sql in [
            "DELETE FROM reference_edges WHERE source = ?",
            "DELETE FROM tag_edges WHERE source = ?",
            "DELETE FROM entity_aliases WHERE entity = ?",
            "DELETE FROM sync_log WHERE source = ?",
        ] {
            sqlx::query(table_sql)
                .bind(&id_str)
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn counts(&self) -> Result<(i64, i64, i64), LinkGraphError> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM entities), (SELECT COUNT(*) FROM reference_edges), \
             (SELECT COUNT(*) FROM tag_edges)",
        )
        .fetch_one(&self.0)
        .await?;
        Ok((row.try_get(0)?, row.try_get(1)?, row.try_get(2)?))
    }
}

impl LinkStore for DbConnection {
    async fn entity(&self, id: EntityId) -> Result<Option<Entity>, LinkGraphError> {
        let entity = sqlx::query_as::<_, Entity>("SELECT * FROM entities WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.0)
            .await?;
        let Some(entity) = entity else {
            return Ok(None);
        };
        let mut found = [entity];
        self.attach_aliases(&mut found).await?;
        let [entity] = found;
        Ok(Some(entity))
    }

    #[tracing::instrument(skip(self))]
    async fn world_entities(&self, world: WorldId) -> Result<Vec<Entity>, LinkGraphError> {
        let mut entities =
            sqlx::query_as::<_, Entity>("SELECT * FROM entities WHERE world = ? ORDER BY rowid")
                .bind(world.to_string())
                .fetch_all(&self.0)
                .await
                .map_err(|e| {
                    tracing::error!("[DbConnection.world_entities] SQL error: {}", e);
                    e
                })?;
        self.attach_aliases(&mut entities).await?;
        Ok(entities)
    }

    async fn reference_edges(&self, source: EntityId) -> Result<Vec<ReferenceEdge>, LinkGraphError> {
        Ok(sqlx::query_as::<_, ReferenceEdge>(
            "SELECT * FROM reference_edges WHERE source = ? ORDER BY position",
        )
        .bind(source.to_string())
        .fetch_all(&self.0)
        .await?)
    }

    async fn tag_edges(&self, source: EntityId) -> Result<Vec<TagEdge>, LinkGraphError> {
        Ok(
            sqlx::query_as::<_, TagEdge>("SELECT * FROM tag_edges WHERE source = ? ORDER BY position")
                .bind(source.to_string())
                .fetch_all(&self.0)
                .await?,
        )
    }

    #[tracing::instrument(skip(self))]
    async fn backlinks(&self, target: EntityId) -> Result<Vec<Backlink>, LinkGraphError> {
        let rows = sqlx::query(
            "SELECT r.source, r.display_text, r.position, r.created_at, e.title, e.body \
             FROM reference_edges r LEFT JOIN entities e ON e.id = r.source \
             WHERE r.target = ? ORDER BY r.created_at DESC, r.source, r.position",
        )
        .bind(target.to_string())
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            tracing::error!("[DbConnection.backlinks] SQL error: {}", e);
            e
        })?;

        let mut backlinks = Vec::with_capacity(rows.len());
        for row in rows {
            let source: &str = row.try_get("source")?;
            let position = usize::try_from(row.try_get::<i64, _>("position")?)
                .map_err(|e| LinkGraphError::Serialization(format!("edge position: {e}")))?;
            let title: Option<String> = row.try_get("title")?;
            let body: Option<String> = row.try_get("body")?;
            backlinks.push(Backlink {
                source: EntityId::try_from(source)?,
                source_title: title.unwrap_or_default(),
                display_text: row.try_get("display_text")?,
                position,
                snippet: body.map(|body| snippet(&body, position, SNIPPET_RADIUS)),
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(backlinks)
    }

    async fn tagged(&self, world: WorldId, tag: &str) -> Result<Vec<Backlink>, LinkGraphError> {
        let rows = sqlx::query(
            "SELECT t.source, t.position, t.created_at, e.title, e.body \
             FROM tag_edges t JOIN entities e ON e.id = t.source \
             WHERE t.tag = ? AND e.world = ? ORDER BY t.created_at DESC, t.source",
        )
        .bind(tag)
        .bind(world.to_string())
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            tracing::error!("[DbConnection.tagged] SQL error: {}", e);
            e
        })?;

        let mut mentions = Vec::with_capacity(rows.len());
        for row in rows {
            let source: &str = row.try_get("source")?;
            let position = usize::try_from(row.try_get::<i64, _>("position")?)
                .map_err(|e| LinkGraphError::Serialization(format!("tag position: {e}")))?;
            let title: Option<String> = row.try_get("title")?;
            let body: Option<String> = row.try_get("body")?;
            mentions.push(Backlink {
                source: EntityId::try_from(source)?,
                source_title: title.unwrap_or_default(),
                display_text: None,
                position,
                snippet: body.map(|body| snippet(&body, position, SNIPPET_RADIUS)),
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(mentions)
    }

    async fn resolve(&self, ids: &[EntityId]) -> Result<Vec<ResolvedTarget>, LinkGraphError> {
        let mut titles = BTreeMap::<EntityId, Option<String>>::new();
        for chunk in ids.chunks(SQLITE_LIMIT_VARIABLE_NUMBER) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, title FROM entities WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk.iter() {
                separated.push_bind::<String>(id.into());
            }
            qb.push(")");
            let rows = qb
                .build_query_as::<(String, Option<String>)>()
                .fetch_all(&self.0)
                .await?;
            for (id, title) in rows {
                titles.insert(EntityId::try_from(id.as_str())?, title);
            }
        }
        Ok(ids
            .iter()
            .map(|id| ResolvedTarget {
                id: *id,
                exists: titles.contains_key(id),
                title: titles.get(id).cloned().flatten(),
            })
            .collect())
    }

    #[tracing::instrument(skip(self, body))]
    async fn reconcile(
        &self,
        source: EntityId,
        body: BodySource,
        sync_tags: bool,
    ) -> Result<SyncReport, LinkGraphError> {
        let mut edge_tx = SqliteTransaction {
            tx: self.0.begin().await?,
        };
        match reconcile(&mut edge_tx, source, body, sync_tags).await {
            Ok(report) => {
                edge_tx.tx.commit().await.map_err(|e| {
                    tracing::error!("[DbConnection.reconcile] commit failed for {}: {}", source, e);
                    e
                })?;
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback) = edge_tx.tx.rollback().await {
                    tracing::error!(
                        "[DbConnection.reconcile] rollback failed for {}: {}",
                        source,
                        rollback
                    );
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
    pub kind: MigrationType,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            let mut migrations = Vec::new();
            for migration in self.0 {
                if matches!(migration.kind, MigrationType::ReversibleUp) {
                    migrations.push(SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        migration.kind,
                        migration.sql.into(),
                        false,
                    ));
                }
            }
            Ok(migrations)
        })
    }
}

fn migrations() -> MigrationList {
    MigrationList(vec![
        Migration {
            version: 1,
            description: "create_initial_tables",
            sql: "\
            CREATE TABLE entities (id TEXT PRIMARY KEY, world TEXT NOT NULL, title TEXT, body TEXT, modified_at INTEGER NOT NULL, synced_at INTEGER); \
            CREATE TABLE entity_aliases (entity TEXT NOT NULL, alias TEXT NOT NULL, ordering INTEGER NOT NULL, UNIQUE(entity, alias)); \
            CREATE TABLE reference_edges (source TEXT NOT NULL, target TEXT NOT NULL, display_text TEXT, position INTEGER NOT NULL, created_at INTEGER NOT NULL, UNIQUE(source, target, position)); \
            CREATE TABLE tag_edges (source TEXT NOT NULL, tag TEXT NOT NULL, position INTEGER NOT NULL, created_at INTEGER NOT NULL, UNIQUE(source, tag)); \
            CREATE TABLE sync_log (source TEXT PRIMARY KEY, attempted_at INTEGER NOT NULL);",
            kind: MigrationType::ReversibleUp,
        },
        Migration {
            version: 2,
            description: "create_lookup_indexes",
            sql: "\
            CREATE INDEX idx_entities_world ON entities(world); \
            CREATE INDEX idx_reference_edges_target ON reference_edges(target); \
            CREATE INDEX idx_tag_edges_tag ON tag_edges(tag);",
            kind: MigrationType::ReversibleUp,
        },
    ])
}

async fn db_connect(
    options: SqliteConnectOptions,
    pool_options: PoolOptions<Sqlite>,
) -> Result<DbConnection, LinkGraphError> {
    let options = options
        .read_only(false)
        .busy_timeout(BUSY_TIMEOUT)
        .disable_statement_logging();
    let pool = pool_options.connect_with(options).await?;

    let migrator = Migrator::new(migrations()).await.map_err(|e| {
        LinkGraphError::Storage(format!("could not resolve migrations: {e}"))
    })?;
    migrator
        .run(&pool)
        .await
        .map_err(|e| LinkGraphError::Storage(format!("migration failed: {e}")))?;

    let db = DbConnection(pool);
    let (entities, links, tags) = db.counts().await?;
    tracing::info!(
        "DB Connection initialized.\n \
         \tEntity count:\t{} \n \
         \tReference edge count:\t{} \n \
         \tTag edge count:\t{}",
        entities,
        links,
        tags
    );
    Ok(db)
}

/// Opens (creating if needed) the database file at `db_path` and runs pending migrations.
pub async fn db_init(db_path: &Path) -> Result<DbConnection, LinkGraphError> {
    tracing::debug!("Initializing lorelink db from file: {:?}", db_path);
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    db_connect(options, PoolOptions::<Sqlite>::new()).await
}

/// A private in-memory database. Pinned to a single connection, since every SQLite memory
/// connection is its own database.
pub async fn db_init_memory() -> Result<DbConnection, LinkGraphError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool_options = PoolOptions::<Sqlite>::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None);
    db_connect(options, pool_options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_run_on_memory_db() {
        let db = db_init_memory().await.unwrap();
        assert_eq!(db.counts().await.unwrap(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_put_entity_round_trips_aliases() {
        let db = db_init_memory().await.unwrap();
        let entity = Entity::new(WorldId::new(), "Waterdeep")
            .with_alias("City of Splendors")
            .with_alias("Deepwater")
            .with_body("A city.");
        db.put_entity(&entity).await.unwrap();

        let loaded = db.entity(entity.id).await.unwrap().unwrap();
        assert_eq!(loaded, entity);

        let world = db.world_entities(entity.world).await.unwrap();
        assert_eq!(world, vec![entity]);
    }

    #[tokio::test]
    async fn test_staged_edges_flush_over_bind_limit() {
        let db = db_init_memory().await.unwrap();
        let source = Entity::new(WorldId::new(), "Index");
        db.put_entity(&source).await.unwrap();

        let target = EntityId::new();
        let plan = EdgePlan {
            insert_links: (0..8000)
                .map(|position| ReferenceEdge {
                    source: source.id,
                    target,
                    display_text: None,
                    position,
                    created_at: 1,
                })
                .collect(),
            ..EdgePlan::default()
        };
        let mut edge_tx = SqliteTransaction {
            tx: db.0.begin().await.unwrap(),
        };
        edge_tx.apply_plan(source.id, &plan).await.unwrap();
        edge_tx.tx.commit().await.unwrap();

        assert_eq!(db.reference_edges(source.id).await.unwrap().len(), 8000);
    }
}
