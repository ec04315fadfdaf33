//! # Attribution Tracker
//!
//! Fork bookkeeping. A fork is a fresh private copy whose `forked_from`
//! points at its immediate parent and whose `original_creator` names the
//! root of the lineage, however deep the chain gets. Forking never touches
//! the source and never waits on the network.

use std::collections::HashSet;

use charter_core::{
    ContentId, Creator, ForkSource, RemoteId, RemoteSnapshot, RemoteState, SyncStatus, SyncStore,
    SyncableContent, Visibility
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

fn forked(
    title: &str,
    content_type: charter_core::ContentType,
    body: &serde_json::Value,
    forker: Creator,
    forked_from: ForkSource,
    root: &Creator,
    now: DateTime<Utc>
) -> SyncableContent {
    SyncableContent {
        id: ContentId::new(),
        title: title.to_string(),
        content_type,
        body: body.clone(),
        creator: forker,
        visibility: Visibility::Private,
        remote: RemoteState::Unpublished,
        forked_from: Some(forked_from),
        original_creator: Some(root.clone()),
        fork_count: 0,
        created_at: now,
        updated_at: now,
        sync_status: SyncStatus::LocalOnly,
        pending_deletion: false
    }
}

/// Fork a locally held item.
pub fn fork_local(
    source: &SyncableContent,
    forker: Creator,
    now: DateTime<Utc>
) -> SyncableContent {
    forked(
        &source.title,
        source.content_type,
        &source.body,
        forker,
        ForkSource::Local {
            content_id: source.id
        },
        source.attribution_root(),
        now
    )
}

/// Fork an item known only from the remote service. This is also how an
/// owner recovers published content after deleting every local copy.
pub fn fork_remote(
    source: &RemoteSnapshot,
    forker: Creator,
    now: DateTime<Utc>
) -> SyncableContent {
    forked(
        &source.title,
        source.content_type,
        &source.body,
        forker,
        ForkSource::Remote {
            remote_id: source.remote_id.clone()
        },
        source.attribution_root(),
        now
    )
}

/// One hop of a fork chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionNode {
    pub content_id: ContentId,
    pub creator: Creator,
    pub original_creator: Option<Creator>,
    pub forked_from: Option<ForkSource>,
    pub created_at: DateTime<Utc>
}

impl From<&SyncableContent> for AttributionNode {
    fn from(content: &SyncableContent) -> Self {
        Self {
            content_id: content.id,
            creator: content.creator.clone(),
            original_creator: content.original_creator.clone(),
            forked_from: content.forked_from.clone(),
            created_at: content.created_at
        }
    }
}

/// Lineage of a content item as far as it is held locally, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionChain {
    pub nodes: Vec<AttributionNode>,
    /// Set when the oldest local node still points at a parent that is not
    /// held locally.
    pub unresolved_parent: Option<ForkSource>
}

impl AttributionChain {
    /// Walk `forked_from` links from `content_id` through the local store.
    pub async fn build(store: &dyn SyncStore, content_id: ContentId) -> Result<Self> {
        let mut current = store
            .get_content(&content_id)
            .await?
            .ok_or(SyncError::ContentNotFound { id: content_id })?;

        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        loop {
            if !seen.insert(current.id) {
                return Err(SyncError::InvariantViolation {
                    detail: format!("fork chain through {} is cyclic", current.id)
                });
            }
            nodes.push(AttributionNode::from(&current));

            let Some(parent) = current.forked_from.clone() else {
                return Ok(Self {
                    nodes,
                    unresolved_parent: None
                });
            };
            let next = match &parent {
                ForkSource::Local { content_id } => store.get_content(content_id).await?,
                ForkSource::Remote { remote_id } => store.find_by_remote_id(remote_id).await?
            };
            match next {
                Some(next) => current = next,
                None => {
                    return Ok(Self {
                        nodes,
                        unresolved_parent: Some(parent)
                    });
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Creator at the head of the lineage.
    pub fn root_creator(&self) -> Option<&Creator> {
        let oldest = self.nodes.last()?;
        Some(oldest.original_creator.as_ref().unwrap_or(&oldest.creator))
    }

    /// Every fork in the chain names the same root creator.
    pub fn is_consistent(&self) -> bool {
        let Some(root) = self.root_creator() else {
            return true;
        };
        self.nodes
            .iter()
            .filter(|node| node.forked_from.is_some())
            .all(|node| node.original_creator.as_ref().map(|c| &c.id) == Some(&root.id))
    }

    /// Remote id of the nearest remote-originated parent, if any.
    pub fn remote_parent(&self) -> Option<&RemoteId> {
        self.nodes.iter().find_map(|node| match &node.forked_from {
            Some(ForkSource::Remote { remote_id }) => Some(remote_id),
            _ => None
        })
    }
}
