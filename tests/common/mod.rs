//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use lorelink::properties::{Entity, WorldId};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A small Sword Coast world: two cities, a harbor with an alias, and a ship's log that
/// mentions all of them in plain text.
///
/// Returned in the order: Water, Waterdeep, Waterdeep Harbor, Ship's Log.
#[allow(dead_code)]
pub fn sword_coast(world: WorldId) -> Vec<Entity> {
    vec![
        Entity::new(world, "Water"),
        Entity::new(world, "Waterdeep"),
        Entity::new(world, "Waterdeep Harbor").with_alias("the Docks"),
        Entity::new(world, "Ship's Log").with_body(SHIPS_LOG),
    ]
}

#[allow(dead_code)]
pub const SHIPS_LOG: &str = "Day 3. Sighted Waterdeep at dawn; fresh water is scarce.\n\
Moored in Waterdeep Harbor, near the Docks. `Waterdeep` is painted on the hull.\n\
See [the charter](https://example.com/waterdeep) for the route. #voyage";

/// A temporary database file path; the directory lives as long as the returned guard.
#[cfg(feature = "service")]
#[allow(dead_code)]
pub fn temp_db() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lorelink.db");
    (dir, path)
}
