//! Durable sync queue over the key-value surface.

use std::sync::Arc;

use super::KeyValueStore;
use crate::error::Result;
use crate::models::{SyncOp, SyncQueueItem};

const QUEUE_KEY: &str = "sync_queue";

/// Ordered log of pending mutations awaiting propagation.
///
/// FIFO by insertion; same-entity ordering is what drains rely on, and it
/// holds because every mutation path appends exactly once per user action.
#[derive(Clone)]
pub struct SyncQueueStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SyncQueueStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn all(&self) -> Vec<SyncQueueItem> {
        match self.load().await {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!("failed to load sync queue, treating as empty: {error}");
                Vec::new()
            }
        }
    }

    pub async fn add(&self, item: SyncQueueItem) -> Result<()> {
        let mut items = self.all().await;
        items.push(item);
        self.save(&items).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut items = self.all().await;
        items.retain(|item| item.id != id);
        self.save(&items).await
    }

    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SyncQueueItem),
    {
        let mut items = self.all().await;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            mutate(item);
            self.save(&items).await?;
        }
        Ok(())
    }

    /// Drop pending items of the given ops for one entity. Used to cancel a
    /// never-synced create/update chain when the event is deleted before it
    /// ever reached the remote store.
    pub async fn remove_entity_ops(&self, entity_id: &str, ops: &[SyncOp]) -> Result<usize> {
        let mut items = self.all().await;
        let before = items.len();
        items.retain(|item| item.entity_id != entity_id || !ops.contains(&item.op));
        let dropped = before - items.len();
        if dropped > 0 {
            self.save(&items).await?;
        }
        Ok(dropped)
    }

    async fn load(&self) -> Result<Vec<SyncQueueItem>> {
        match self.kv.get(QUEUE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, items: &[SyncQueueItem]) -> Result<()> {
        self.kv.set(QUEUE_KEY, serde_json::to_string(items)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangePayload, EntityKind};
    use crate::storage::MemoryKv;
    use pretty_assertions::assert_eq;

    fn store() -> SyncQueueStore {
        SyncQueueStore::new(Arc::new(MemoryKv::new()))
    }

    fn item(op: SyncOp, entity_id: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            op,
            EntityKind::Event,
            entity_id.to_string(),
            ChangePayload::default(),
        )
    }

    #[tokio::test]
    async fn queue_preserves_insertion_order() {
        let store = store();
        store.add(item(SyncOp::Create, "a")).await.unwrap();
        store.add(item(SyncOp::Update, "a")).await.unwrap();
        store.add(item(SyncOp::Create, "b")).await.unwrap();

        let ops: Vec<SyncOp> = store.all().await.iter().map(|i| i.op).collect();
        assert_eq!(ops, vec![SyncOp::Create, SyncOp::Update, SyncOp::Create]);
    }

    #[tokio::test]
    async fn update_increments_retry_count() {
        let store = store();
        let queued = item(SyncOp::Create, "a");
        let id = queued.id.clone();
        store.add(queued).await.unwrap();

        store.update(&id, |i| i.retry_count += 1).await.unwrap();
        assert_eq!(store.all().await[0].retry_count, 1);
    }

    #[tokio::test]
    async fn remove_entity_ops_cancels_matching_items() {
        let store = store();
        store.add(item(SyncOp::Create, "a")).await.unwrap();
        store.add(item(SyncOp::Update, "a")).await.unwrap();
        store.add(item(SyncOp::Delete, "a")).await.unwrap();
        store.add(item(SyncOp::Create, "b")).await.unwrap();

        let dropped = store
            .remove_entity_ops("a", &[SyncOp::Create, SyncOp::Update])
            .await
            .unwrap();
        assert_eq!(dropped, 2);

        let remaining = store.all().await;
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .any(|i| i.entity_id == "a" && i.op == SyncOp::Delete));
    }
}
