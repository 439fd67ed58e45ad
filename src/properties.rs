//! Identifiers, entities and the persisted edge rows of the link graph.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    time::SystemTime,
};
use uuid::Uuid;

#[cfg(feature = "service")]
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::error::LinkGraphError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// A fresh random identifier.
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                $name(Uuid::nil())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = LinkGraphError;

            fn try_from(string: &str) -> Result<Self, Self::Error> {
                Ok($name(Uuid::parse_str(string)?))
            }
        }

        impl FromStr for $name {
            type Err = LinkGraphError;

            fn from_str(string: &str) -> Result<Self, Self::Err> {
                $name::try_from(string)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}",
                    self.0.hyphenated().encode_lower(&mut Uuid::encode_buffer())
                )
            }
        }

        impl From<&$name> for String {
            fn from(val: &$name) -> Self {
                format!("{val}")
            }
        }

        impl From<$name> for String {
            fn from(val: $name) -> Self {
                format!("{val}")
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of an article/record whose title can be referenced from other bodies.
    EntityId
);

uuid_newtype!(
    /// Partition scope. Only entities of the same world are candidate match targets.
    WorldId
);

/// Milliseconds since the unix epoch. Used for every persisted timestamp.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Whether the persisted edges of an entity reflect its current body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Unsynced,
    Synced,
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub world: WorldId,
    pub title: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub body: Option<String>,
    pub modified_at: i64,
    pub synced_at: Option<i64>,
}

impl Entity {
    pub fn new(world: WorldId, title: &str) -> Self {
        Entity {
            id: EntityId::new(),
            world,
            title: Some(title.to_string()),
            aliases: Vec::new(),
            body: None,
            modified_at: now_millis(),
            synced_at: None,
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// Title for display purposes; empty when the entity is untitled.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn sync_state(&self) -> SyncState {
        match self.synced_at {
            Some(synced) if synced >= self.modified_at => SyncState::Synced,
            _ => SyncState::Unsynced,
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let title = match self.display_title() {
            "" => "(Untitled)",
            title => title,
        };
        write!(f, "{} ({}) [{}]", title, self.id, self.sync_state())
    }
}

/// A directed link: `source`'s body references `target` at character offset `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub display_text: Option<String>,
    pub position: usize,
    pub created_at: i64,
}

/// Edge identity used when reconciling against a fresh parse.
pub type ReferenceKey = (EntityId, usize, Option<String>);

impl ReferenceEdge {
    pub fn key(&self) -> ReferenceKey {
        (self.target, self.position, self.display_text.clone())
    }
}

/// Legacy hash-style tag attached to a source; one row per (source, tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEdge {
    pub source: EntityId,
    pub tag: String,
    pub position: usize,
    pub created_at: i64,
}

/// An incoming edge as seen from its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub source: EntityId,
    pub source_title: String,
    pub display_text: Option<String>,
    pub position: usize,
    pub snippet: Option<String>,
    pub created_at: i64,
}

/// An outgoing edge annotated with whether its target still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingLink {
    pub target: EntityId,
    pub target_title: Option<String>,
    pub display_text: Option<String>,
    pub position: usize,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub id: EntityId,
    pub exists: bool,
    pub title: Option<String>,
}

#[cfg(feature = "service")]
fn position_from_row(row: &SqliteRow) -> sqlx::Result<usize> {
    let position: i64 = row.try_get("position")?;
    usize::try_from(position).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(feature = "service")]
impl FromRow<'_, SqliteRow> for ReferenceEdge {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let source_str: &str = row.try_get("source")?;
        let target_str: &str = row.try_get("target")?;
        Ok(ReferenceEdge {
            source: EntityId::try_from(source_str)?,
            target: EntityId::try_from(target_str)?,
            display_text: row.try_get("display_text")?,
            position: position_from_row(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(feature = "service")]
impl FromRow<'_, SqliteRow> for TagEdge {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let source_str: &str = row.try_get("source")?;
        Ok(TagEdge {
            source: EntityId::try_from(source_str)?,
            tag: row.try_get("tag")?,
            position: position_from_row(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Aliases live in their own table; callers fill [Entity::aliases] after loading the row.
#[cfg(feature = "service")]
impl FromRow<'_, SqliteRow> for Entity {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let id_str: &str = row.try_get("id")?;
        let world_str: &str = row.try_get("world")?;
        Ok(Entity {
            id: EntityId::try_from(id_str)?,
            world: WorldId::try_from(world_str)?,
            title: row.try_get("title")?,
            aliases: Vec::new(),
            body: row.try_get("body")?,
            modified_at: row.try_get("modified_at")?,
            synced_at: row.try_get("synced_at")?,
        })
    }
}
