use std::sync::atomic::{AtomicU32, Ordering};

use charter_core::{
    ContentType, Creator, RemoteId, RemoteSnapshot, SyncableContent, UserId, Visibility
};
use chrono::{DateTime, Utc};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Creator whose display name is the upper-cased id.
pub fn user(id: &str) -> Creator {
    let user_id = UserId::new(id).unwrap_or_else(|| panic!("invalid test user id {id:?}"));
    Creator::new(user_id, id.to_uppercase())
}

pub fn checklist(creator: Creator, now: DateTime<Utc>) -> SyncableContent {
    SyncableContent::new(
        "Pre-departure checklist",
        ContentType::Checklist,
        serde_json::json!({"items": ["weather", "fuel", "lifejackets"]}),
        creator,
        now
    )
}

/// Public remote record with no lineage.
pub fn remote_snapshot(remote_id: &str, creator: Creator) -> RemoteSnapshot {
    RemoteSnapshot {
        remote_id: RemoteId::new(remote_id),
        title: "Harbour guide".to_string(),
        content_type: ContentType::Guide,
        body: serde_json::json!({"berths": 12}),
        visibility: Visibility::Public,
        creator,
        forked_from: None,
        original_creator: None,
        fork_count: 0,
        updated_at: Utc::now()
    }
}
