//! Shared fixtures for in-crate tests.

use crate::{
    properties::{Entity, EntityId, WorldId},
    store::MemoryStore,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A world of titled entities in a fresh [MemoryStore]. Ids come back in the order of `titles`.
pub fn memory_world(titles: &[&str]) -> (MemoryStore, WorldId, Vec<EntityId>) {
    init_logging();
    let store = MemoryStore::new();
    let world = WorldId::new();
    let ids = titles
        .iter()
        .map(|title| {
            let entity = Entity::new(world, title);
            let id = entity.id;
            store.put_entity(entity);
            id
        })
        .collect();
    (store, world, ids)
}
