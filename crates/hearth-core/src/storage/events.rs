//! Local event store over the key-value surface.

use std::sync::Arc;

use chrono::Utc;

use super::KeyValueStore;
use crate::error::Result;
use crate::models::{Event, EventId};

const EVENTS_KEY: &str = "events";

/// Durable store of the device's full event set, serialized as one list.
///
/// This is a cache, not a system of record: read failures are logged and
/// surfaced as empty results so callers keep working while degraded.
#[derive(Clone)]
pub struct EventStore {
    kv: Arc<dyn KeyValueStore>,
}

impl EventStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Every stored event, deleted ones included. Date fields are
    /// re-hydrated through serde on each load since the backing storage is
    /// text.
    pub async fn all(&self) -> Vec<Event> {
        match self.load().await {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!("failed to load events, treating as empty: {error}");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &EventId) -> Option<Event> {
        self.all().await.into_iter().find(|e| &e.id == id)
    }

    pub async fn add(&self, event: Event) -> Result<()> {
        let mut events = self.all().await;
        events.push(event);
        self.save(&events).await
    }

    /// Merge a change into the stored record and stamp `updated_at = now`.
    ///
    /// Returns the updated record, or `None` when no record matches.
    pub async fn update<F>(&self, id: &EventId, mutate: F) -> Result<Option<Event>>
    where
        F: FnOnce(&mut Event),
    {
        let mut events = self.all().await;
        let Some(event) = events.iter_mut().find(|e| &e.id == id) else {
            return Ok(None);
        };
        mutate(event);
        event.updated_at = Utc::now();
        let updated = event.clone();
        self.save(&events).await?;
        Ok(Some(updated))
    }

    /// Physically remove a record. Queue cleanup and tooling only; user
    /// deletion always tombstones through the facade instead.
    pub async fn remove(&self, id: &EventId) -> Result<()> {
        let mut events = self.all().await;
        events.retain(|e| &e.id != id);
        self.save(&events).await
    }

    async fn load(&self) -> Result<Vec<Event>> {
        match self.kv.get(EVENTS_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, events: &[Event]) -> Result<()> {
        self.kv
            .set(EVENTS_KEY, serde_json::to_string(events)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventDraft;
    use crate::storage::MemoryKv;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn store() -> EventStore {
        EventStore::new(Arc::new(MemoryKv::new()))
    }

    fn sample(title: &str) -> Event {
        Event::from_draft(EventDraft {
            title: title.to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 15, 19, 0, 0).unwrap(),
            group_id: "family".to_string(),
            created_by: "user-1".to_string(),
            ..EventDraft::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn add_and_get_roundtrip() {
        let store = store();
        let event = sample("Dinner");
        store.add(event.clone()).await.unwrap();

        let fetched = store.get(&event.id).await.unwrap();
        assert_eq!(fetched.title, "Dinner");
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn update_merges_and_stamps_updated_at() {
        let store = store();
        let event = sample("Dinner");
        let before = event.updated_at;
        store.add(event.clone()).await.unwrap();

        let updated = store
            .update(&event.id, |e| e.title = "Dinner out".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Dinner out");
        assert!(updated.updated_at >= before);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_none() {
        let store = store();
        let result = store.update(&EventId::new(), |_| {}).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn remove_hard_deletes() {
        let store = store();
        let event = sample("Dinner");
        store.add(event.clone()).await.unwrap();
        store.remove(&event.id).await.unwrap();
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_payload_reads_as_empty() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(EVENTS_KEY, "{broken".to_string()).await.unwrap();
        let store = EventStore::new(kv);
        assert!(store.all().await.is_empty());
    }
}
