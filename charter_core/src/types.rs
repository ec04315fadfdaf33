use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(Uuid);

impl ContentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for QueueItemId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 100 {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the remote content service on first publish.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: UserId,
    pub name: String
}

impl Creator {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into()
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ContentType {
    Checklist,
    Guide,
    Deck,
    Charter
}

/// Ordered exposure level of a content item.
///
/// Only `Public` content is returned by unauthenticated discovery queries.
/// `Community` content is synced but not discoverable, which matters for the
/// label shown next to a synced item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Visibility {
    Private,
    Community,
    Public
}

impl Visibility {
    pub fn is_sync_eligible(self) -> bool {
        self != Self::Private
    }

    pub fn is_discoverable(self) -> bool {
        self == Self::Public
    }
}

/// Whether the content has a remote counterpart.
///
/// A published item always carries its remote id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RemoteState {
    #[default]
    Unpublished,
    #[serde(rename_all = "camelCase")]
    Published { remote_id: RemoteId }
}

impl RemoteState {
    pub fn published(remote_id: RemoteId) -> Self {
        Self::Published { remote_id }
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        match self {
            Self::Published { remote_id } => Some(remote_id),
            Self::Unpublished => None
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Immediate parent of a fork.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ForkSource {
    #[serde(rename_all = "camelCase")]
    Local { content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    Remote { remote_id: RemoteId }
}

/// Per-content sync indicator, re-derived from the queue on every commit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    LocalOnly,
    Pending,
    Syncing,
    PendingAuth,
    Synced,
    Failed
}

/// User-facing label combining visibility and sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "camelCase")]
pub enum SyncLabel {
    Private,
    Queued,
    Syncing,
    NeedsAuthToSync,
    #[serde(rename_all = "camelCase")]
    Failed {
        reason: Option<String>
    },
    SharedWithCommunity,
    PublishedPublicly
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableContent {
    pub id: ContentId,
    pub title: String,
    pub content_type: ContentType,
    pub body: serde_json::Value,
    pub creator: Creator,
    pub visibility: Visibility,
    #[serde(default)]
    pub remote: RemoteState,
    /// Set once at fork time, never changed afterwards.
    pub forked_from: Option<ForkSource>,
    /// Root of the lineage; set once at fork time.
    pub original_creator: Option<Creator>,
    /// Server-authoritative; only ever written from a pull.
    #[serde(default)]
    pub fork_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Hidden locally while an unpublish-and-delete or a release is queued.
    #[serde(default)]
    pub pending_deletion: bool
}

impl SyncableContent {
    pub fn new(
        title: impl Into<String>,
        content_type: ContentType,
        body: serde_json::Value,
        creator: Creator,
        now: DateTime<Utc>
    ) -> Self {
        Self {
            id: ContentId::new(),
            title: title.into(),
            content_type,
            body,
            creator,
            visibility: Visibility::Private,
            remote: RemoteState::Unpublished,
            forked_from: None,
            original_creator: None,
            fork_count: 0,
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::LocalOnly,
            pending_deletion: false
        }
    }

    /// Creator at the head of the lineage: the recorded original creator for
    /// forks, the content's own creator otherwise.
    pub fn attribution_root(&self) -> &Creator {
        self.original_creator.as_ref().unwrap_or(&self.creator)
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        ContentSnapshot {
            content_id: self.id,
            title: self.title.clone(),
            content_type: self.content_type,
            body: self.body.clone(),
            visibility: self.visibility,
            creator: self.creator.clone(),
            forked_from: self.forked_from.clone(),
            original_creator: self.original_creator.clone(),
            updated_at: self.updated_at
        }
    }

    pub fn label(&self, last_error: Option<&str>) -> SyncLabel {
        match self.sync_status {
            SyncStatus::Pending => SyncLabel::Queued,
            SyncStatus::Syncing => SyncLabel::Syncing,
            SyncStatus::PendingAuth => SyncLabel::NeedsAuthToSync,
            SyncStatus::Failed => SyncLabel::Failed {
                reason: last_error.map(str::to_string)
            },
            SyncStatus::LocalOnly | SyncStatus::Synced => match self.visibility {
                Visibility::Private => SyncLabel::Private,
                Visibility::Community if self.remote.is_published() => {
                    SyncLabel::SharedWithCommunity
                }
                Visibility::Public if self.remote.is_published() => SyncLabel::PublishedPublicly,
                Visibility::Community | Visibility::Public => SyncLabel::Queued
            }
        }
    }
}

/// Full content payload sent on publish and publish-update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    pub content_id: ContentId,
    pub title: String,
    pub content_type: ContentType,
    pub body: serde_json::Value,
    pub visibility: Visibility,
    pub creator: Creator,
    pub forked_from: Option<ForkSource>,
    pub original_creator: Option<Creator>,
    pub updated_at: DateTime<Utc>
}

/// Remote view of a published item, as returned by discovery or a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    pub remote_id: RemoteId,
    pub title: String,
    pub content_type: ContentType,
    pub body: serde_json::Value,
    pub visibility: Visibility,
    pub creator: Creator,
    pub forked_from: Option<ForkSource>,
    pub original_creator: Option<Creator>,
    #[serde(default)]
    pub fork_count: u64,
    pub updated_at: DateTime<Utc>
}

impl RemoteSnapshot {
    pub fn attribution_root(&self) -> &Creator {
        self.original_creator.as_ref().unwrap_or(&self.creator)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SyncOperation {
    Publish,
    PublishUpdate,
    Unpublish,
    /// Local-bookkeeping twin of `Unpublish`: drops local ownership and
    /// leaves the remote record in place.
    Release,
    ForkNotify
}

/// Supersession key. `Publish`/`PublishUpdate` share a class, as do
/// `Unpublish`/`Release`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OperationClass {
    Publish,
    Unpublish,
    ForkNotify
}

impl SyncOperation {
    pub fn class(self) -> OperationClass {
        match self {
            Self::Publish | Self::PublishUpdate => OperationClass::Publish,
            Self::Unpublish | Self::Release => OperationClass::Unpublish,
            Self::ForkNotify => OperationClass::ForkNotify
        }
    }

    pub fn requires_remote(self) -> bool {
        self != Self::Release
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationPayload {
    Snapshot(ContentSnapshot),
    /// Remote id known when the unpublish was queued, used if the content
    /// record is gone by the time the item is processed.
    #[serde(rename_all = "camelCase")]
    Unpublish { remote_id: Option<RemoteId> },
    #[serde(rename_all = "camelCase")]
    Release { remote_id: Option<RemoteId> },
    #[serde(rename_all = "camelCase")]
    ForkNotify { source_remote_id: RemoteId }
}

impl OperationPayload {
    pub fn snapshot(&self) -> Option<&ContentSnapshot> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            _ => None
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum QueueStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    PendingAuth
}

impl QueueStatus {
    /// Statuses counted by the one-item-per-class invariant.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InFlight | Self::PendingAuth)
    }

    /// Not yet handed to the remote service; may be superseded or discarded.
    pub fn is_unsent(self) -> bool {
        matches!(self, Self::Pending | Self::PendingAuth | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    pub content_id: ContentId,
    pub operation: SyncOperation,
    pub payload: OperationPayload,
    pub status: QueueStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Enqueue order; FIFO per content is by this value.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Newer snapshot recorded while this item was in flight.
    #[serde(default)]
    pub follow_up: Option<ContentSnapshot>
}

impl SyncQueueItem {
    pub fn new(
        content_id: ContentId,
        operation: SyncOperation,
        payload: OperationPayload,
        status: QueueStatus,
        sequence: u64,
        now: DateTime<Utc>
    ) -> Self {
        Self {
            id: QueueItemId::new(),
            content_id,
            operation,
            payload,
            status,
            attempt_count: 0,
            last_error: None,
            sequence,
            created_at: now,
            next_attempt_at: Some(now),
            follow_up: None
        }
    }

    pub fn class(&self) -> OperationClass {
        self.operation.class()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Bearer credential; the token never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Authenticated(BearerToken),
    Unauthenticated
}

impl Credential {
    pub fn token(&self) -> Option<&BearerToken> {
        match self {
            Self::Authenticated(token) => Some(token),
            Self::Unauthenticated => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn creator(id: &str) -> Creator {
        Creator::new(UserId::new(id).unwrap(), id.to_uppercase())
    }

    #[test]
    fn test_visibility_ordering_and_eligibility() {
        assert!(Visibility::Private < Visibility::Community);
        assert!(Visibility::Community < Visibility::Public);
        assert!(!Visibility::Private.is_sync_eligible());
        assert!(Visibility::Community.is_sync_eligible());
        assert!(!Visibility::Community.is_discoverable());
        assert!(Visibility::Public.is_discoverable());
    }

    #[test]
    fn test_visibility_from_str() {
        assert_eq!(Visibility::from_str("community").unwrap(), Visibility::Community);
        assert_eq!(Visibility::Public.to_string(), "public");
        assert!(Visibility::from_str("secret").is_err());
    }

    #[test]
    fn test_remote_state_serialization() {
        let state = RemoteState::published(RemoteId::new("r-42"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"state": "published", "remoteId": "r-42"}));

        let back: RemoteState = serde_json::from_value(json).unwrap();
        assert_eq!(back.remote_id().map(RemoteId::as_str), Some("r-42"));
        assert!(!RemoteState::Unpublished.is_published());
    }

    #[test]
    fn test_operation_classes() {
        assert_eq!(SyncOperation::Publish.class(), SyncOperation::PublishUpdate.class());
        assert_eq!(SyncOperation::Unpublish.class(), SyncOperation::Release.class());
        assert_ne!(SyncOperation::Publish.class(), SyncOperation::Unpublish.class());
        assert_eq!(SyncOperation::ForkNotify.class(), OperationClass::ForkNotify);
        assert!(!SyncOperation::Release.requires_remote());
    }

    #[test]
    fn test_attribution_root_defaults_to_creator() {
        let mut content = SyncableContent::new(
            "Boat prep",
            ContentType::Checklist,
            serde_json::json!({"items": []}),
            creator("u1"),
            Utc::now()
        );
        assert_eq!(content.attribution_root().id.as_str(), "u1");

        content.original_creator = Some(creator("u0"));
        assert_eq!(content.attribution_root().id.as_str(), "u0");
    }

    #[test]
    fn test_label_distinguishes_community_from_public() {
        let mut content = SyncableContent::new(
            "Harbour guide",
            ContentType::Guide,
            serde_json::json!({}),
            creator("u1"),
            Utc::now()
        );
        assert_eq!(content.label(None), SyncLabel::Private);

        content.visibility = Visibility::Community;
        content.remote = RemoteState::published(RemoteId::new("r-1"));
        content.sync_status = SyncStatus::Synced;
        assert_eq!(content.label(None), SyncLabel::SharedWithCommunity);

        content.visibility = Visibility::Public;
        assert_eq!(content.label(None), SyncLabel::PublishedPublicly);

        content.sync_status = SyncStatus::Failed;
        assert_eq!(
            content.label(Some("title required")),
            SyncLabel::Failed {
                reason: Some("title required".to_string())
            }
        );
    }

    #[test]
    fn test_queue_item_due() {
        let now = Utc::now();
        let mut item = SyncQueueItem::new(
            ContentId::new(),
            SyncOperation::Publish,
            OperationPayload::Unpublish { remote_id: None },
            QueueStatus::Pending,
            1,
            now
        );
        assert!(item.is_due(now));

        item.next_attempt_at = Some(now + chrono::Duration::seconds(5));
        assert!(!item.is_due(now));

        item.next_attempt_at = Some(now);
        item.status = QueueStatus::PendingAuth;
        assert!(!item.is_due(now));
    }

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let credential = Credential::Authenticated(BearerToken::new("secret-token"));
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert_eq!(credential.token().map(BearerToken::expose), Some("secret-token"));
    }
}
