//! End-to-end behaviour of the synchronizer and suggestion service over the in-memory store.

use crate::{
    codec::parse_references,
    error::LinkGraphError,
    graph::{BodyUpdate, LinkGraphSynchronizer, SyncReport, TagReport},
    properties::{Entity, SyncState},
    store::{LinkStore, MemoryStore},
    suggest::{ReferenceSuggestionService, SuggestionMode, SuggestionVariant},
    tests::helpers::memory_world,
};

fn service(store: MemoryStore) -> ReferenceSuggestionService<MemoryStore> {
    ReferenceSuggestionService::new(LinkGraphSynchronizer::new(store))
}

#[tokio::test]
async fn sync_is_idempotent() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    let text = format!("Arrived at [[{}|the city]]. #travel", ids[0]);
    store.set_body(ids[1], &text).unwrap();
    let sync = LinkGraphSynchronizer::new(store);

    let first = sync.sync(ids[1], Some(&text)).await.unwrap();
    assert_eq!(
        first,
        SyncReport {
            removed: 0,
            added: 1,
            tags: TagReport {
                removed: 0,
                added: 1,
                repositioned: 0
            }
        }
    );
    let second = sync.sync(ids[1], Some(&text)).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn unchanged_resync_keeps_created_at() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    store
        .set_body(ids[1], &format!("[[{}]] and [[{}]]", ids[0], ids[0]))
        .unwrap();
    let sync = LinkGraphSynchronizer::new(store);
    sync.resync(ids[1]).await.unwrap();
    let before = sync.store().reference_edges(ids[1]).await.unwrap();
    assert_eq!(before.len(), 2);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(sync.resync(ids[1]).await.unwrap().is_empty());
    let after = sync.store().reference_edges(ids[1]).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn moved_link_is_replaced_and_tags_are_repositioned() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    let sync = LinkGraphSynchronizer::new(store.clone());
    store
        .set_body(ids[1], &format!("#sea #port [[{}]]", ids[0]))
        .unwrap();
    sync.resync(ids[1]).await.unwrap();

    store
        .set_body(ids[1], &format!("Later: #port #sea [[{}]]", ids[0]))
        .unwrap();
    let report = sync.resync(ids[1]).await.unwrap();
    assert_eq!((report.removed, report.added), (1, 1));
    assert_eq!(
        report.tags,
        TagReport {
            removed: 0,
            added: 0,
            repositioned: 2
        }
    );

    let tags = store.tag_edges(ids[1]).await.unwrap();
    let names = tags.iter().map(|t| t.tag.as_str()).collect::<Vec<&str>>();
    assert_eq!(names, vec!["port", "sea"]);
}

#[tokio::test]
async fn synchronizer_without_tags_ignores_hash_tokens() {
    let (store, _world, ids) = memory_world(&["Log"]);
    store.set_body(ids[0], "#alpha #beta").unwrap();
    let sync = LinkGraphSynchronizer::new(store).without_tags();
    assert!(!sync.syncs_tags());
    assert!(sync.resync(ids[0]).await.unwrap().is_empty());
    assert!(sync.store().tag_edges(ids[0]).await.unwrap().is_empty());
}

#[tokio::test]
async fn sync_state_follows_writes() {
    let (store, _world, ids) = memory_world(&["Log"]);
    store.set_body(ids[0], "draft").unwrap();
    let sync = LinkGraphSynchronizer::new(store.clone());

    let state = |e: Option<Entity>| e.map(|e| e.sync_state());
    assert_eq!(state(store.entity(ids[0]).await.unwrap()), Some(SyncState::Unsynced));
    sync.resync(ids[0]).await.unwrap();
    assert_eq!(state(store.entity(ids[0]).await.unwrap()), Some(SyncState::Synced));
    store.set_body(ids[0], "edited").unwrap();
    assert_eq!(state(store.entity(ids[0]).await.unwrap()), Some(SyncState::Unsynced));
}

#[tokio::test]
async fn replacing_a_synced_entity_marks_it_unsynced() {
    let (store, _world, ids) = memory_world(&["Log"]);
    store.set_body(ids[0], "v1").unwrap();
    let sync = LinkGraphSynchronizer::new(store.clone());
    sync.resync(ids[0]).await.unwrap();

    let mut entity = store.entity(ids[0]).await.unwrap().unwrap();
    assert_eq!(entity.sync_state(), SyncState::Synced);
    entity.body = Some("v2 edited".to_string());
    store.put_entity(entity);

    let stored = store.entity(ids[0]).await.unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("v2 edited"));
    assert_eq!(stored.sync_state(), SyncState::Unsynced);
    sync.resync(ids[0]).await.unwrap();
    let stored = store.entity(ids[0]).await.unwrap().unwrap();
    assert_eq!(stored.sync_state(), SyncState::Synced);
}

#[tokio::test]
async fn editor_link_elements_become_edges() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    let text = format!(
        r#"Sailed to <span data-type="wiki-link" data-target-id="{}">the city</span>."#,
        ids[0]
    );
    store.set_body(ids[1], &text).unwrap();
    let sync = LinkGraphSynchronizer::new(store.clone());

    let report = sync.resync(ids[1]).await.unwrap();
    assert_eq!(report.added, 1);
    let edges = store.reference_edges(ids[1]).await.unwrap();
    assert_eq!(edges[0].target, ids[0]);
    assert_eq!(edges[0].display_text.as_deref(), Some("the city"));
    assert_eq!(edges[0].position, 10);
    assert_eq!(store.backlinks(ids[0]).await.unwrap()[0].source, ids[1]);
    assert!(sync.resync(ids[1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_apply_changes_nothing() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    store.set_body(ids[1], "Waterdeep at dawn").unwrap();
    let sync = LinkGraphSynchronizer::new(store.clone());

    let update = BodyUpdate {
        expected: Some("Waterdeep at dawn".to_string()),
        new: format!("[[{}|Waterdeep]] at dawn", ids[0]),
    };
    store.set_body(ids[1], "Waterdeep at dusk").unwrap();

    let err = sync.apply(ids[1], update).await.unwrap_err();
    assert_eq!(err, LinkGraphError::StaleSuggestion(ids[1]));
    assert!(!err.is_retryable());

    let entity = store.entity(ids[1]).await.unwrap().unwrap();
    assert_eq!(entity.body.as_deref(), Some("Waterdeep at dusk"));
    assert!(store.reference_edges(ids[1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_commit_rolls_back_and_can_be_retried() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    store.set_body(ids[1], "Off to Waterdeep.").unwrap();
    let service = service(store.clone());

    store.fail_next_commit();
    let err = service
        .suggest(ids[1], SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let entity = store.entity(ids[1]).await.unwrap().unwrap();
    assert_eq!(entity.body.as_deref(), Some("Off to Waterdeep."));
    assert_eq!(entity.sync_state(), SyncState::Unsynced);
    assert!(store.reference_edges(ids[1]).await.unwrap().is_empty());

    let retried = service
        .suggest(ids[1], SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(retried.applied, 1);
    assert_eq!(store.reference_edges(ids[1]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn preview_persists_nothing_and_apply_round_trips() {
    let (store, _world, ids) = memory_world(&["Water", "Waterdeep", "Log"]);
    let body = "Waterdeep sells Water. `Waterdeep` and [[Waterdeep]] stay put.";
    store.set_body(ids[2], body).unwrap();
    let service = service(store.clone());

    let preview = service
        .suggest(ids[2], SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap();
    assert_eq!(preview.applied, 2);
    assert_eq!(preview.sync, None);
    let stored = store.entity(ids[2]).await.unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some(body));

    let applied = service
        .suggest(ids[2], SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(applied.new_text, preview.new_text);
    let targets = parse_references(Some(&applied.new_text))
        .iter()
        .filter_map(|r| r.link_target())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec![ids[1], ids[0]]);
    assert_eq!(applied.sync.unwrap().added, 2);

    let again = service
        .suggest(ids[2], SuggestionVariant::Link, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(again.applied, 0);
    assert_eq!(again.sync, Some(SyncReport::default()));
}

#[tokio::test]
async fn entity_never_links_to_itself() {
    let (store, _world, ids) = memory_world(&["Waterdeep"]);
    store
        .set_body(ids[0], "Waterdeep is the City of Splendors.")
        .unwrap();
    let service = service(store);
    let result = service
        .suggest(ids[0], SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap();
    assert_eq!(result.applied, 0);
    assert!(result.matches.is_empty());
}

#[tokio::test]
async fn tag_apply_persists_plain_tokens() {
    let (store, _world, ids) = memory_world(&["Waterdeep Harbor", "Log"]);
    store.set_body(ids[1], "Docked at Waterdeep Harbor.").unwrap();
    let service = service(store.clone());

    let preview = service
        .suggest(ids[1], SuggestionVariant::Tag, SuggestionMode::Preview)
        .await
        .unwrap();
    assert_eq!(preview.new_text, "Docked at <mark>#waterdeep-harbor</mark>.");

    let applied = service
        .suggest(ids[1], SuggestionVariant::Tag, SuggestionMode::Apply)
        .await
        .unwrap();
    assert_eq!(applied.new_text, "Docked at #waterdeep-harbor.");
    assert_eq!(applied.sync.unwrap().tags.added, 1);
    let tags = store.tag_edges(ids[1]).await.unwrap();
    assert_eq!(tags[0].tag, "waterdeep-harbor");
}

#[tokio::test]
async fn draft_text_preview_strips_old_highlights() {
    let (store, world, ids) = memory_world(&["Neverwinter"]);
    let service = service(store);
    let result = service
        .suggest_text(
            world,
            None,
            "<mark>#old</mark> then Neverwinter",
            SuggestionVariant::Tag,
        )
        .await
        .unwrap();
    assert_eq!(result.new_text, "#old then <mark>#neverwinter</mark>");
    assert_eq!(result.matches[0].candidate, ids[0]);
}

#[tokio::test]
async fn world_run_applies_each_entity() {
    let (store, world, ids) = memory_world(&["Alice", "Bob", "Carol"]);
    store.set_body(ids[0], "Alice knows Bob.").unwrap();
    store.set_body(ids[1], "Bob owes Carol and Alice.").unwrap();
    store.set_body(ids[2], "Nobody here.").unwrap();
    let service = service(store.clone());

    let dry = service
        .suggest_world(world, SuggestionVariant::Link, SuggestionMode::Preview)
        .await
        .unwrap();
    assert_eq!(dry.outcomes.len(), 2);
    assert!(store.reference_edges(ids[0]).await.unwrap().is_empty());

    let report = service
        .apply_world(world, SuggestionVariant::Link)
        .await
        .unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.total_applied, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(store.backlinks(ids[0]).await.unwrap().len(), 1);
    assert_eq!(store.backlinks(ids[2]).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_syncs_of_one_source_settle() {
    let (store, _world, ids) = memory_world(&["Waterdeep", "Log"]);
    let text = format!("[[{}]] #a #b", ids[0]);
    store.set_body(ids[1], &text).unwrap();
    let sync = LinkGraphSynchronizer::new(store.clone());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sync = sync.clone();
        let source = ids[1];
        handles.push(tokio::spawn(async move { sync.resync(source).await }));
    }
    let mut added = 0;
    for handle in handles {
        added += handle.await.unwrap().unwrap().added;
    }
    assert_eq!(added, 1);
    assert_eq!(store.reference_edges(ids[1]).await.unwrap().len(), 1);
    assert_eq!(store.tag_edges(ids[1]).await.unwrap().len(), 2);
}
