//! End-to-end behavior of the public API over the in-memory store:
//! - scanning a realistic body with overlapping names, aliases and protected regions
//! - preview versus apply, and the graph that apply leaves behind
//! - external edits flipping the sync state, and deleted targets

mod common;

use common::{sword_coast, SHIPS_LOG};
use lorelink::{
    codec::{parse_references, protected_ranges, scan, CandidateSet, ReferenceKind},
    graph::LinkGraphSynchronizer,
    properties::{EntityId, SyncState, WorldId},
    store::{LinkStore, MemoryStore},
    suggest::{ReferenceSuggestionService, SuggestionMode, SuggestionVariant},
    LinkGraphError,
};
use test_log::test;

fn seeded() -> (ReferenceSuggestionService<MemoryStore>, WorldId, Vec<EntityId>) {
    let store = MemoryStore::new();
    let world = WorldId::new();
    let entities = sword_coast(world);
    let ids = entities.iter().map(|e| e.id).collect();
    for entity in entities {
        store.put_entity(entity);
    }
    (
        ReferenceSuggestionService::new(LinkGraphSynchronizer::new(store)),
        world,
        ids,
    )
}

#[test]
fn test_scan_respects_protection_and_longest_match() {
    let world = WorldId::new();
    let entities = sword_coast(world);
    let candidates = entities
        .iter()
        .fold(CandidateSet::builder().exclude(entities[3].id), |b, e| {
            b.entity(e, true)
        })
        .build()
        .unwrap();

    let protected = protected_ranges(SHIPS_LOG);
    let occurrences = scan(SHIPS_LOG, &candidates, &protected).unwrap();
    let found = occurrences
        .iter()
        .map(|o| (o.matched_text.as_str(), o.title.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        found,
        vec![
            ("Waterdeep", "Waterdeep"),
            ("water", "Water"),
            ("Waterdeep Harbor", "Waterdeep Harbor"),
            ("the Docks", "Waterdeep Harbor"),
        ]
    );
    for occ in occurrences.iter() {
        assert!(!protected.overlaps(occ.start, occ.end()));
    }
}

#[test(tokio::test)]
async fn test_preview_then_apply_builds_the_graph() {
    let (service, _world, ids) = seeded();
    let log = ids[3];

    let preview = service
        .suggest(log, SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap();
    assert_eq!(preview.applied, 4);
    assert_eq!(preview.matches.len(), 4);
    assert!(preview.matches[3].is_alias);
    let stored = service.store().entity(log).await.unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some(SHIPS_LOG));
    assert!(service.store().reference_edges(log).await.unwrap().is_empty());

    let applied = service
        .suggest(log, SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(applied.new_text, preview.new_text);
    let report = applied.sync.unwrap();
    assert_eq!((report.removed, report.added), (0, 4));
    assert_eq!(report.tags.added, 1);

    let links = parse_references(Some(&applied.new_text))
        .into_iter()
        .filter_map(|r| match r.kind {
            ReferenceKind::Link { target, display } => Some((target, display)),
            ReferenceKind::Tag { .. } => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        links,
        vec![
            (ids[1], Some("Waterdeep".to_string())),
            (ids[0], Some("water".to_string())),
            (ids[2], Some("Waterdeep Harbor".to_string())),
            (ids[2], Some("the Docks".to_string())),
        ]
    );
    assert!(applied.new_text.contains("`Waterdeep`"));
    assert!(applied.new_text.contains("(https://example.com/waterdeep)"));

    let harbor = service.store().backlinks(ids[2]).await.unwrap();
    assert_eq!(harbor.len(), 2);
    assert!(harbor.iter().all(|b| b.source_title == "Ship's Log"));
    assert!(harbor[0].snippet.is_some());

    let outgoing = service.store().outgoing(log).await.unwrap();
    assert_eq!(outgoing.len(), 4);
    assert!(outgoing.iter().all(|l| l.resolved));

    let entity = service.store().entity(log).await.unwrap().unwrap();
    assert_eq!(entity.sync_state(), SyncState::Synced);
}

#[test(tokio::test)]
async fn test_tag_world_run_persists_slugs() {
    let (service, world, ids) = seeded();
    let report = service
        .apply_world(world, SuggestionVariant::Tag)
        .await
        .unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.total_applied, 3);

    let tags = service
        .store()
        .tag_edges(ids[3])
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.tag)
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["waterdeep", "water", "waterdeep-harbor", "voyage"]);
    let body = service.store().entity(ids[3]).await.unwrap().unwrap().body.unwrap();
    assert!(!body.contains("<mark>"));
}

#[test(tokio::test)]
async fn test_external_edit_between_preview_and_apply() {
    let (service, _world, ids) = seeded();
    let log = ids[3];
    service.resync(log).await.unwrap();

    let preview = service
        .suggest(log, SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap();
    assert!(preview.applied > 0);

    // Another writer appends to the log; the next apply scans the new body and succeeds.
    let edited = format!("{SHIPS_LOG}\nDay 4. Left Waterdeep.");
    service.store().set_body(log, &edited).unwrap();
    let entity = service.store().entity(log).await.unwrap().unwrap();
    assert_eq!(entity.sync_state(), SyncState::Unsynced);

    let applied = service
        .suggest(log, SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(applied.applied, preview.applied + 1);
}

#[test(tokio::test)]
async fn test_unknown_entity_is_not_found() {
    let (service, _world, _ids) = seeded();
    let missing = EntityId::new();
    let err = service
        .suggest(missing, SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap_err();
    assert!(matches!(err, LinkGraphError::NotFound(_)));
    assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
}

#[test(tokio::test)]
async fn test_deleted_target_becomes_unresolved() {
    let (service, _world, ids) = seeded();
    service
        .suggest(ids[3], SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert!(service.store().delete_entity(ids[0]));

    let outgoing = service.store().outgoing(ids[3]).await.unwrap();
    let water = outgoing.iter().find(|l| l.target == ids[0]).unwrap();
    assert!(!water.resolved);
    assert_eq!(water.target_title, None);
    let resolved = service.store().resolve(&[ids[0], ids[1]]).await.unwrap();
    assert_eq!(
        resolved.iter().map(|r| r.exists).collect::<Vec<_>>(),
        vec![false, true]
    );
}
