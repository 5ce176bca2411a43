//! Sync queue item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::EventDoc;

/// Items that reach this many failed drain attempts are retained but skipped
/// by further automatic drains.
pub const RETRY_LIMIT: u32 = 5;

/// Mutation kind awaiting propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOp {
    Create,
    Update,
    Delete,
}

/// Entity a queue item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Event,
    Group,
    User,
}

/// Payload carried by a queue item.
///
/// `remote_id` is the target for update/delete as known at enqueue time; the
/// drain re-resolves it against the live local record, since the create that
/// assigns it may land in the same drain pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChangePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<EventDoc>,
}

/// A pending mutation in the durable sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: String,
    pub op: SyncOp,
    pub entity: EntityKind,
    pub entity_id: String,
    pub payload: ChangePayload,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncQueueItem {
    pub fn new(op: SyncOp, entity: EntityKind, entity_id: String, payload: ChangePayload) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            op,
            entity,
            entity_id,
            payload,
            queued_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Whether automatic drains should still attempt this item.
    pub fn retryable(&self) -> bool {
        self.retry_count < RETRY_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_items_are_retryable() {
        let item = SyncQueueItem::new(
            SyncOp::Delete,
            EntityKind::Event,
            "e1".to_string(),
            ChangePayload::default(),
        );
        assert!(item.retryable());
        assert_eq!(item.retry_count, 0);
    }

    #[test]
    fn items_at_the_ceiling_are_not_retryable() {
        let mut item = SyncQueueItem::new(
            SyncOp::Create,
            EntityKind::Event,
            "e1".to_string(),
            ChangePayload::default(),
        );
        item.retry_count = RETRY_LIMIT;
        assert!(!item.retryable());
    }
}
