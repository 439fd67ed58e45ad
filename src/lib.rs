//! # lorelink
//!
//! Reference detection and link-graph synchronization for free-form campaign notes.
//!
//! Articles ("entities") are written as free text that mentions other articles by name. lorelink
//! finds those mentions, offers to turn them into explicit references, and keeps a persisted
//! graph of who-references-whom consistent with the text.
//!
//! ## Overview
//!
//! Two reference grammars live in the same body:
//!
//! - **bracket links** `[[<entity id>]]` or `[[<entity id>|<display text>]]`
//! - **hash tags** `#waterdeep` (legacy; still parsed and synced)
//!
//! The library is organized around a pure text engine and a thin persistence layer:
//!
//! - **[`codec`]**: parsing, protected ranges, mention scanning and rewriting. Pure functions.
//! - **[`graph`]**: the edge diff (`plan_sync`) and the [`graph::LinkGraphSynchronizer`].
//! - **[`store`]**: the [`store::LinkStore`] seam and the in-process [`store::MemoryStore`].
//! - **[`suggest`]**: the [`suggest::ReferenceSuggestionService`] (preview/apply).
//! - **[`properties`]**: identifiers, entities and edge rows.
//! - **`db`** / **`config`** (feature `service`): the SQLite store and TOML configuration.
//!
//! ## Quick Start
//!
//! ```rust
//! use lorelink::{
//!     graph::LinkGraphSynchronizer,
//!     properties::{Entity, WorldId},
//!     store::{LinkStore, MemoryStore},
//!     suggest::{ReferenceSuggestionService, SuggestionMode, SuggestionVariant},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), lorelink::LinkGraphError> {
//! let world = WorldId::new();
//! let city = Entity::new(world, "Waterdeep");
//! let log = Entity::new(world, "Ship's Log").with_body("We made port in Waterdeep.");
//! let (city_id, log_id) = (city.id, log.id);
//!
//! let store = MemoryStore::new();
//! store.put_entity(city);
//! store.put_entity(log);
//!
//! let service = ReferenceSuggestionService::new(LinkGraphSynchronizer::new(store));
//!
//! // Preview changes nothing.
//! let preview = service
//!     .suggest(log_id, SuggestionVariant::Link, SuggestionMode::Preview)
//!     .await?;
//! assert_eq!(preview.matches[0].title, "Waterdeep");
//!
//! // Apply writes the body and the edge in one transaction.
//! let applied = service
//!     .suggest(log_id, SuggestionVariant::Link, SuggestionMode::Apply)
//!     .await?;
//! assert_eq!(applied.sync.map(|s| s.added), Some(1));
//!
//! let backlinks = service.store().backlinks(city_id).await?;
//! assert_eq!(backlinks[0].source_title, "Ship's Log");
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - A second sync of unchanged text changes nothing.
//! - Suggestions never rewrite inside existing tokens, markdown links, inline code or HTML tags.
//! - When names overlap, the longest one wins: "Waterdeep" beats "Water".
//! - An entity never links to itself.
//! - An apply whose body changed after it was scanned fails with
//!   [`LinkGraphError::StaleSuggestion`] and changes nothing.
//!
//! ## Features
//!
//! - **default**: text engine, synchronizer and in-memory store
//! - **service**: SQLite store (`sqlx`) and TOML configuration
//! - **bin**: the `lorelink` CLI and HTTP API

pub mod codec;
#[cfg(all(feature = "service", not(target_arch = "wasm32")))]
pub mod config;
#[cfg(all(feature = "service", not(target_arch = "wasm32")))]
pub mod db;
pub mod error;
pub mod graph;
pub mod properties;
pub mod store;
pub mod suggest;
#[cfg(test)]
mod tests;

pub use error::*;
