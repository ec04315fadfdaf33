use std::sync::Arc;

use charter_core::{
    ContentType, ForkSource, OperationClass, OperationPayload, QueueStatus, SyncLabel,
    SyncOperation, SyncStatus, Visibility
};
use config::EngineConfig;
use storage::MemoryStore;
use sync::{ContentEdit, DeleteIntent, DeleteOutcome, Disposition, NewContent, SyncEngine};
use testing::{CallKind, ManualClock, ScriptedRemote, TestCredentials, fixtures};

struct Setup {
    engine: Arc<SyncEngine>,
    remote: Arc<ScriptedRemote>,
    credentials: Arc<TestCredentials>
}

async fn setup(credentials: TestCredentials) -> Setup {
    let remote = Arc::new(ScriptedRemote::new());
    let credentials = Arc::new(credentials);
    let engine = SyncEngine::with_clock(
        Arc::new(MemoryStore::new()),
        remote.clone(),
        credentials.clone(),
        Arc::new(ManualClock::starting_now()),
        &EngineConfig::default()
    )
    .await
    .unwrap();
    Setup {
        engine: Arc::new(engine),
        remote,
        credentials
    }
}

fn checklist(owner: &str, visibility: Visibility) -> NewContent {
    NewContent {
        visibility,
        ..NewContent::private(
            "Pre-departure checklist",
            ContentType::Checklist,
            serde_json::json!({"items": ["weather", "fuel"]}),
            fixtures::user(owner)
        )
    }
}

fn retitle(title: &str) -> ContentEdit {
    ContentEdit {
        title: Some(title.to_string()),
        ..ContentEdit::default()
    }
}

fn active_per_class(items: &[charter_core::SyncQueueItem], class: OperationClass) -> usize {
    items
        .iter()
        .filter(|item| item.class() == class && item.status.is_active())
        .count()
}

#[tokio::test]
async fn test_private_content_creates_no_queue_items() {
    // GIVEN a signed-in user
    let s = setup(TestCredentials::signed_in("tok")).await;

    // WHEN a private checklist is created
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Private))
        .await
        .unwrap();

    // THEN nothing is queued and nothing reaches the network
    assert!(s.engine.list_items().await.unwrap().is_empty());
    assert_eq!(content.sync_status, SyncStatus::LocalOnly);
    assert_eq!(s.engine.label(content.id).await.unwrap(), Some(SyncLabel::Private));
    s.engine.drain().await.unwrap();
    assert_eq!(s.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_publish_while_signed_out_waits_for_auth() {
    // GIVEN a signed-out user with private content
    let s = setup(TestCredentials::signed_out()).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Private))
        .await
        .unwrap();

    // WHEN it is made public
    let outcome = s
        .engine
        .set_visibility(content.id, Visibility::Public)
        .await
        .unwrap();

    // THEN the publish is held for auth and drains do nothing
    assert!(outcome.needs_auth);
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, QueueStatus::PendingAuth);
    assert_eq!(
        s.engine.label(content.id).await.unwrap(),
        Some(SyncLabel::NeedsAuthToSync)
    );
    let report = s.engine.drain().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(s.remote.total_calls(), 0);

    // WHEN the user signs in
    s.credentials.sign_in("tok");
    assert_eq!(s.engine.credentials_changed().await.unwrap(), 1);
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items[0].status, QueueStatus::Pending);
    let report = s.engine.drain().await.unwrap();

    // THEN the publish lands and the remote id is recorded
    assert_eq!(report.succeeded, 1);
    let stored = s.engine.content(content.id).await.unwrap().unwrap();
    assert!(stored.remote.is_published());
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert!(s.engine.queue_items(content.id).await.unwrap().is_empty());
    assert_eq!(
        s.engine.label(content.id).await.unwrap(),
        Some(SyncLabel::PublishedPublicly)
    );
}

#[tokio::test]
async fn test_repeated_edits_collapse_into_one_update() {
    // GIVEN published public content
    let s = setup(TestCredentials::signed_in("tok")).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();

    // WHEN it is edited three times before the next drain
    let first = s.engine.edit_content(content.id, retitle("v1")).await.unwrap();
    let second = s.engine.edit_content(content.id, retitle("v2")).await.unwrap();
    let third = s.engine.edit_content(content.id, retitle("v3")).await.unwrap();

    // THEN exactly one publishUpdate remains, carrying the last payload
    assert_eq!(first.enqueued.unwrap().disposition, Disposition::Created);
    assert_eq!(second.enqueued.unwrap().disposition, Disposition::Superseded);
    assert_eq!(third.enqueued.unwrap().item_id, first.enqueued.unwrap().item_id);
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].operation, SyncOperation::PublishUpdate);
    assert_eq!(items[0].payload.snapshot().unwrap().title, "v3");

    s.engine.drain().await.unwrap();
    assert_eq!(s.remote.call_count(CallKind::Update), 1);
    let remote_id = s
        .engine
        .content(content.id)
        .await
        .unwrap()
        .unwrap()
        .remote
        .remote_id()
        .cloned()
        .unwrap();
    assert_eq!(s.remote.record(&remote_id).unwrap().title, "v3");
}

#[tokio::test]
async fn test_published_fork_keeps_original_creator() {
    // GIVEN U1's published public checklist
    let s = setup(TestCredentials::signed_in("tok")).await;
    let source = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    let source_remote = s
        .engine
        .content(source.id)
        .await
        .unwrap()
        .unwrap()
        .remote
        .remote_id()
        .cloned()
        .unwrap();

    // WHEN U2 forks it and publishes the fork
    let fork = s
        .engine
        .fork_local(source.id, fixtures::user("u2"))
        .await
        .unwrap();
    s.engine
        .set_visibility(fork.id, Visibility::Public)
        .await
        .unwrap();
    s.engine.drain().await.unwrap();

    // THEN the fork names its parent and U1 as the original creator
    let fork = s.engine.content(fork.id).await.unwrap().unwrap();
    assert_eq!(
        fork.forked_from,
        Some(ForkSource::Local {
            content_id: source.id
        })
    );
    assert_eq!(fork.creator.id.as_str(), "u2");
    assert_eq!(fork.attribution_root().id.as_str(), "u1");

    let published = s.remote.record(fork.remote.remote_id().unwrap()).unwrap();
    assert_eq!(published.original_creator.unwrap().id.as_str(), "u1");
    assert_eq!(s.remote.record(&source_remote).unwrap().fork_count, 1);

    let lineage = s.engine.lineage(fork.id).await.unwrap();
    assert_eq!(lineage.depth(), 1);
    assert!(lineage.is_consistent());
}

#[tokio::test]
async fn test_delete_keep_published_then_recover_by_fork() {
    // GIVEN U1's published public checklist
    let s = setup(TestCredentials::signed_in("tok")).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    let remote_id = s
        .engine
        .content(content.id)
        .await
        .unwrap()
        .unwrap()
        .remote
        .remote_id()
        .cloned()
        .unwrap();

    // WHEN the local copy is deleted but kept published
    let outcome = s
        .engine
        .delete_content(content.id, Some(DeleteIntent::DeleteLocalKeepPublished))
        .await
        .unwrap();
    assert!(matches!(outcome, DeleteOutcome::PendingRelease { .. }));
    assert!(s.engine.content(content.id).await.unwrap().is_none());
    s.engine.drain().await.unwrap();

    // THEN the local copy is gone and the remote record is untouched
    assert!(s.engine.list_content().await.unwrap().is_empty());
    assert!(s.engine.list_items().await.unwrap().is_empty());
    assert_eq!(s.remote.call_count(CallKind::Delete), 0);
    let record = s.remote.record(&remote_id).unwrap();

    // WHEN the owner forks their own remote record back
    let recovered = s
        .engine
        .fork_remote(&record, fixtures::user("u1"))
        .await
        .unwrap();

    // THEN it is a local private copy attributed to the owner
    assert_eq!(recovered.title, record.title);
    assert_eq!(recovered.visibility, Visibility::Private);
    assert_eq!(recovered.attribution_root().id.as_str(), "u1");
    assert_eq!(
        recovered.forked_from,
        Some(ForkSource::Remote {
            remote_id: remote_id.clone()
        })
    );
}

#[tokio::test]
async fn test_fork_makes_no_network_call() {
    // GIVEN published content and a remote that counts calls
    let s = setup(TestCredentials::signed_in("tok")).await;
    let source = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    let calls_before = s.remote.total_calls();
    let snapshot = fixtures::remote_snapshot("r-remote", fixtures::user("u9"));

    // WHEN forking locally and from a remote snapshot
    let local = s
        .engine
        .fork_local(source.id, fixtures::user("u2"))
        .await
        .unwrap();
    let remote = s
        .engine
        .fork_remote(&snapshot, fixtures::user("u2"))
        .await
        .unwrap();

    // THEN both forks exist locally with only queued notifications
    assert_eq!(s.remote.total_calls(), calls_before);
    for fork in [&local, &remote] {
        let items = s.engine.queue_items(fork.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].operation, SyncOperation::ForkNotify);
        assert_eq!(fork.sync_status, SyncStatus::LocalOnly);
    }
}

#[tokio::test]
async fn test_delete_of_published_content_enqueues_one_unpublish() {
    // GIVEN published content with an unsent edit
    let s = setup(TestCredentials::signed_in("tok")).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Community))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    s.engine
        .edit_content(content.id, retitle("edited"))
        .await
        .unwrap();

    // WHEN it is deleted together with its remote record
    let outcome = s
        .engine
        .delete_content(content.id, Some(DeleteIntent::UnpublishAndDelete))
        .await
        .unwrap();

    // THEN the edit is discarded and exactly one unpublish is queued
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].operation, SyncOperation::Unpublish);
    assert!(matches!(
        outcome,
        DeleteOutcome::PendingUnpublish { item_id } if item_id == items[0].id
    ));

    // AND the content is removed once the remote delete lands
    s.engine.drain().await.unwrap();
    assert_eq!(s.remote.call_count(CallKind::Delete), 1);
    assert_eq!(s.remote.record_count(), 0);
    assert!(s.engine.list_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_private_delete_of_published_content_still_unpublishes() {
    // GIVEN content that was published and then made private, unpublish retrying
    let s = setup(TestCredentials::signed_in("tok")).await;
    s.remote.fail_next(
        CallKind::Delete,
        errors::RemoteError::Server {
            status: 503,
            reason: "unavailable".to_string()
        }
    );
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    s.engine
        .set_visibility(content.id, Visibility::Private)
        .await
        .unwrap();
    assert_eq!(s.engine.drain().await.unwrap().retried, 1);

    // WHEN it is deleted without an intent
    let outcome = s.engine.delete_content(content.id, None).await.unwrap();

    // THEN the queued unpublish is reused, never duplicated
    assert!(matches!(outcome, DeleteOutcome::PendingUnpublish { .. }));
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(active_per_class(&items, OperationClass::Unpublish), 1);
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_edit_during_flight_parks_follow_up() {
    // GIVEN a public create whose remote call is held open
    let s = setup(TestCredentials::signed_in("tok")).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.remote.hold_calls();
    let engine = s.engine.clone();
    let drain = tokio::spawn(async move { engine.drain().await });
    s.remote.wait_until_called().await;

    // WHEN the user edits twice while the create is in flight
    let edit = s.engine.edit_content(content.id, retitle("a")).await.unwrap();
    s.engine.edit_content(content.id, retitle("b")).await.unwrap();

    // THEN the edits are parked on the in-flight item
    assert_eq!(edit.enqueued.unwrap().disposition, Disposition::FollowUp);
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, QueueStatus::InFlight);
    assert_eq!(items[0].follow_up.as_ref().unwrap().title, "b");
    assert_eq!(active_per_class(&items, OperationClass::Publish), 1);
    assert_eq!(
        s.engine.content(content.id).await.unwrap().unwrap().sync_status,
        SyncStatus::Syncing
    );

    // WHEN the call completes
    s.remote.release_calls();
    let report = drain.await.unwrap().unwrap();

    // THEN the follow-up goes out as an update in the same drain
    assert_eq!(report.succeeded, 2);
    let kinds: Vec<_> = s.remote.calls().iter().map(|call| call.kind).collect();
    assert_eq!(kinds, vec![CallKind::Create, CallKind::Update]);
    assert_eq!(s.remote.calls()[1].title.as_deref(), Some("b"));
    assert!(s.engine.queue_items(content.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unpublish_then_publish_keeps_last_intent() {
    // GIVEN published public content, signed out so nothing drains
    let s = setup(TestCredentials::signed_in("tok")).await;
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();
    s.engine.drain().await.unwrap();
    s.credentials.sign_out();

    // WHEN the user goes private and then public again
    s.engine
        .set_visibility(content.id, Visibility::Private)
        .await
        .unwrap();
    s.engine
        .set_visibility(content.id, Visibility::Public)
        .await
        .unwrap();

    // THEN only the publish-class intent remains
    let items = s.engine.queue_items(content.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].operation, SyncOperation::PublishUpdate);
    assert!(matches!(items[0].payload, OperationPayload::Snapshot(_)));
}

#[tokio::test]
async fn test_remote_id_only_after_successful_publish() {
    // GIVEN a remote that rejects the create
    let s = setup(TestCredentials::signed_in("tok")).await;
    s.remote.fail_next(
        CallKind::Create,
        errors::RemoteError::Validation {
            reason: "title too long".to_string()
        }
    );
    let content = s
        .engine
        .create_content(checklist("u1", Visibility::Public))
        .await
        .unwrap();

    // WHEN the queue drains
    s.engine.drain().await.unwrap();

    // THEN no remote id was recorded for content whose publish never landed
    let stored = s.engine.content(content.id).await.unwrap().unwrap();
    assert!(!stored.remote.is_published());
    assert_eq!(stored.sync_status, SyncStatus::Failed);
    assert_eq!(
        s.engine.label(content.id).await.unwrap(),
        Some(SyncLabel::Failed {
            reason: Some("Validation rejected: title too long".to_string())
        })
    );
}
