//! # Conflict Resolver
//!
//! Pull reconciliation: decides whether a fetched remote snapshot replaces
//! the local copy. Queued local intent always beats a pull, whatever the
//! timestamps say; otherwise the configured strategy decides. The fork count
//! is server-authoritative and is taken from the remote either way.

use charter_core::{
    ContentId, OperationClass, QueueStatus, RemoteSnapshot, SyncQueueItem, SyncableContent
};
use config::ResolverConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Remote wins only when strictly newer.
    #[default]
    LastWriteWins,
    PreferLocal,
    PreferRemote
}

/// What the resolver decided for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    ApplyRemote,
    KeepLocal,
    /// Local has queued work for this content; it takes precedence.
    LocalPending
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// No local copy carries this remote id.
    NotTracked,
    #[serde(rename_all = "camelCase")]
    RemoteApplied { content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    KeptLocal { content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    LocalPending { content_id: ContentId }
}

pub struct ConflictResolver {
    strategy: ReconcileStrategy
}

impl ConflictResolver {
    pub fn new(strategy: ReconcileStrategy) -> Self {
        Self { strategy }
    }

    /// Unknown strategy names fall back to last-write-wins.
    pub fn from_config(config: &ResolverConfig) -> Self {
        let strategy = config.strategy.parse().unwrap_or_else(|_| {
            warn!(
                strategy = %config.strategy,
                "Unknown reconcile strategy, using last_write_wins"
            );
            ReconcileStrategy::default()
        });
        Self::new(strategy)
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    pub fn resolve(
        &self,
        local: &SyncableContent,
        items: &[SyncQueueItem],
        remote: &RemoteSnapshot
    ) -> Resolution {
        if local.pending_deletion || has_local_intent(items) {
            return Resolution::LocalPending;
        }

        match self.strategy {
            ReconcileStrategy::PreferLocal => Resolution::KeepLocal,
            ReconcileStrategy::PreferRemote => Resolution::ApplyRemote,
            ReconcileStrategy::LastWriteWins if remote.updated_at > local.updated_at => {
                Resolution::ApplyRemote
            }
            ReconcileStrategy::LastWriteWins => Resolution::KeepLocal
        }
    }
}

/// Unsent or in-flight publish work, or any active unpublish work.
fn has_local_intent(items: &[SyncQueueItem]) -> bool {
    items.iter().any(|item| match item.class() {
        OperationClass::Publish => item.status.is_unsent() || item.status == QueueStatus::InFlight,
        OperationClass::Unpublish => item.status.is_active(),
        OperationClass::ForkNotify => false
    })
}

/// Overwrite the editable fields of `local` with the remote snapshot.
/// Identity, ownership, lineage and visibility never change on a pull;
/// visibility only moves on an explicit user transition.
pub fn apply_remote(local: &mut SyncableContent, remote: &RemoteSnapshot) {
    local.title.clone_from(&remote.title);
    local.content_type = remote.content_type;
    local.body.clone_from(&remote.body);
    local.updated_at = remote.updated_at;
    local.fork_count = remote.fork_count;
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::{
        ContentType, Creator, OperationPayload, RemoteId, RemoteState, SyncOperation, UserId,
        Visibility
    };
    use chrono::{Duration, Utc};
    use std::str::FromStr;

    fn local() -> SyncableContent {
        let mut content = SyncableContent::new(
            "Fuel log",
            ContentType::Checklist,
            serde_json::json!({"litres": 40}),
            Creator::new(UserId::new("u1").unwrap(), "Ana"),
            Utc::now()
        );
        content.visibility = Visibility::Public;
        content.remote = RemoteState::published(RemoteId::new("r-5"));
        content
    }

    fn remote(local: &SyncableContent, offset: Duration) -> RemoteSnapshot {
        RemoteSnapshot {
            remote_id: RemoteId::new("r-5"),
            title: "Fuel log (remote)".to_string(),
            content_type: local.content_type,
            body: serde_json::json!({"litres": 55}),
            visibility: Visibility::Public,
            creator: local.creator.clone(),
            forked_from: None,
            original_creator: None,
            fork_count: 7,
            updated_at: local.updated_at + offset
        }
    }

    #[test]
    fn test_last_write_wins_by_timestamp() {
        let resolver = ConflictResolver::new(ReconcileStrategy::LastWriteWins);
        let local = local();

        assert_eq!(
            resolver.resolve(&local, &[], &remote(&local, Duration::seconds(5))),
            Resolution::ApplyRemote
        );
        assert_eq!(
            resolver.resolve(&local, &[], &remote(&local, Duration::seconds(-5))),
            Resolution::KeepLocal
        );
        assert_eq!(
            resolver.resolve(&local, &[], &remote(&local, Duration::zero())),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn test_pending_local_edit_beats_newer_remote() {
        let resolver = ConflictResolver::new(ReconcileStrategy::PreferRemote);
        let local = local();
        let item = SyncQueueItem::new(
            local.id,
            SyncOperation::PublishUpdate,
            OperationPayload::Snapshot(local.snapshot()),
            QueueStatus::Pending,
            1,
            Utc::now()
        );

        assert_eq!(
            resolver.resolve(&local, &[item], &remote(&local, Duration::hours(1))),
            Resolution::LocalPending
        );
    }

    #[test]
    fn test_fork_notify_does_not_block_pull() {
        let resolver = ConflictResolver::new(ReconcileStrategy::LastWriteWins);
        let local = local();
        let item = SyncQueueItem::new(
            local.id,
            SyncOperation::ForkNotify,
            OperationPayload::ForkNotify {
                source_remote_id: RemoteId::new("r-1")
            },
            QueueStatus::Pending,
            1,
            Utc::now()
        );

        assert_eq!(
            resolver.resolve(&local, &[item], &remote(&local, Duration::hours(1))),
            Resolution::ApplyRemote
        );
    }

    #[test]
    fn test_apply_remote_keeps_identity() {
        let mut local = local();
        let id = local.id;
        let creator = local.creator.clone();
        let snapshot = remote(&local, Duration::seconds(1));

        apply_remote(&mut local, &snapshot);

        assert_eq!(local.id, id);
        assert_eq!(local.creator, creator);
        assert_eq!(local.title, "Fuel log (remote)");
        assert_eq!(local.fork_count, 7);
    }

    #[test]
    fn test_strategy_parses_config_names() {
        assert_eq!(
            ReconcileStrategy::from_str("prefer_local").unwrap(),
            ReconcileStrategy::PreferLocal
        );
        assert_eq!(ReconcileStrategy::LastWriteWins.to_string(), "last_write_wins");
        assert!(ReconcileStrategy::from_str("manual").is_err());
    }

    #[test]
    fn test_unknown_config_strategy_falls_back() {
        let resolver = ConflictResolver::from_config(&ResolverConfig {
            strategy: "manual".to_string()
        });
        assert_eq!(resolver.strategy(), ReconcileStrategy::LastWriteWins);

        let resolver = ConflictResolver::from_config(&ResolverConfig {
            strategy: "prefer_remote".to_string()
        });
        assert_eq!(resolver.strategy(), ReconcileStrategy::PreferRemote);
    }
}
