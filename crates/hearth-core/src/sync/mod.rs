//! Offline-first sync engine.
//!
//! Reconciles the local event store with the shared remote store under
//! intermittent connectivity: immediate best-effort remote writes with a
//! durable queued-retry fallback, and inbound merges under last-writer-wins
//! with tombstone precedence. Constructed once at startup and passed by
//! reference to consumers; it keeps no ambient global state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::models::{
    ChangePayload, EntityKind, Event, EventId, SyncOp, SyncQueueItem,
};
use crate::remote::{EventDoc, RemoteEvent, RemoteStore};
use crate::state::SyncStatus;
use crate::storage::{EventStore, SyncQueueStore};

/// How recently a local record must have been created for the pull-time
/// duplicate heuristic to adopt a remote id onto it.
const RECENT_CREATE_WINDOW_SECS: i64 = 120;

pub struct SyncEngine {
    events: EventStore,
    queue: SyncQueueStore,
    remote: Arc<dyn RemoteStore>,
    connectivity: watch::Receiver<bool>,
    status: watch::Sender<SyncStatus>,
    // Held for the duration of a drain; try-locked so a drain in progress is
    // never started twice.
    drain_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        events: EventStore,
        queue: SyncQueueStore,
        remote: Arc<dyn RemoteStore>,
        connectivity: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let initial = if *connectivity.borrow() {
            SyncStatus::Synced
        } else {
            SyncStatus::Offline
        };
        Arc::new(Self {
            events,
            queue,
            remote,
            connectivity,
            status: watch::channel(initial).0,
            drain_guard: Mutex::new(()),
        })
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Observe status transitions. The receiver carries the current value
    /// immediately and every transition afterwards.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub(crate) fn note_offline(&self) {
        self.set_status(SyncStatus::Offline);
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Best-effort direct remote create. Returns the assigned remote id, or
    /// `None` on any failure or when known-offline so the caller can fall
    /// back to queueing; never raises for transient remote trouble. On
    /// success the local record is stamped with the remote id and marked
    /// synced.
    pub async fn create_event_immediate(
        &self,
        local_id: &EventId,
        doc: EventDoc,
    ) -> Option<String> {
        if !self.is_online() {
            return None;
        }
        match self.remote.create_event(doc).await {
            Ok(remote_id) => {
                let adopted = self
                    .events
                    .update(local_id, |e| {
                        e.remote_id = Some(remote_id.clone());
                        e.is_synced = true;
                    })
                    .await;
                if let Err(error) = adopted {
                    tracing::warn!("failed to record remote id for {local_id}: {error}");
                }
                Some(remote_id)
            }
            Err(error) => {
                tracing::warn!("immediate create failed: {error}");
                None
            }
        }
    }

    /// Best-effort direct remote delete; `false` on failure or offline.
    pub async fn delete_event_immediate(&self, remote_id: &str) -> bool {
        if !self.is_online() || remote_id.is_empty() {
            return false;
        }
        match self.remote.delete_event(remote_id).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("immediate delete of {remote_id} failed: {error}");
                false
            }
        }
    }

    /// Durably enqueue a mutation, then attempt a drain if currently online.
    pub async fn queue_operation(
        &self,
        op: SyncOp,
        entity: EntityKind,
        entity_id: String,
        payload: ChangePayload,
    ) -> Result<()> {
        self.queue
            .add(SyncQueueItem::new(op, entity, entity_id, payload))
            .await?;
        if self.is_online() {
            self.sync_pending_changes().await;
        }
        Ok(())
    }

    /// Pending queue items, exhausted ones included (operator-visible).
    pub async fn pending_items(&self) -> Vec<SyncQueueItem> {
        self.queue.all().await
    }

    /// Drop pending items of the given ops for one entity.
    pub async fn cancel_pending(&self, entity_id: &str, ops: &[SyncOp]) -> Result<usize> {
        self.queue.remove_entity_ops(entity_id, ops).await
    }

    /// Drain the queue against the remote store.
    ///
    /// Skipped entirely when offline (status `offline`) and when a drain is
    /// already running. Items are processed sequentially in FIFO order so an
    /// update enqueued behind its create is applied only after the create's
    /// remote write lands. Per-item failures bump the retry counter and keep
    /// the item queued; only a failure of the drain machinery itself moves
    /// the status to `error`.
    pub async fn sync_pending_changes(&self) {
        if !self.is_online() {
            self.set_status(SyncStatus::Offline);
            return;
        }
        let Ok(_guard) = self.drain_guard.try_lock() else {
            tracing::debug!("drain already in progress, skipping");
            return;
        };

        self.set_status(SyncStatus::Syncing);
        match self.drain().await {
            Ok(()) => self.set_status(SyncStatus::Synced),
            Err(error) => {
                tracing::error!("sync drain failed: {error}");
                self.set_status(SyncStatus::Error);
            }
        }
    }

    async fn drain(&self) -> Result<()> {
        let items = self.queue.all().await;
        for item in items.into_iter().filter(SyncQueueItem::retryable) {
            match self.process_item(&item).await {
                Ok(()) => self.queue.remove(&item.id).await?,
                Err(error) => {
                    tracing::warn!(
                        "sync item failed ({:?} {:?} {}): {error}",
                        item.entity,
                        item.op,
                        item.entity_id
                    );
                    self.queue.update(&item.id, |i| i.retry_count += 1).await?;
                }
            }
        }
        Ok(())
    }

    async fn process_item(&self, item: &SyncQueueItem) -> Result<()> {
        match item.entity {
            EntityKind::Event => self.process_event_item(item).await,
            EntityKind::Group | EntityKind::User => {
                tracing::debug!("no remote propagation for {:?} items yet", item.entity);
                Ok(())
            }
        }
    }

    async fn process_event_item(&self, item: &SyncQueueItem) -> Result<()> {
        let entity_id = EventId::from(item.entity_id.as_str());
        match item.op {
            SyncOp::Create => {
                let doc = require_doc(item)?;
                let remote_id = self.remote.create_event(doc).await?;
                self.events
                    .update(&entity_id, |e| {
                        e.remote_id = Some(remote_id.clone());
                        e.is_synced = true;
                    })
                    .await?;
                Ok(())
            }
            SyncOp::Update => {
                let doc = require_doc(item)?;
                // The create that assigns the remote id may have landed
                // earlier in this same drain, so resolve against the live
                // record rather than trusting the enqueue-time payload.
                let Some(remote_id) = self.resolve_remote_id(item).await else {
                    return Err(Error::Remote(format!(
                        "update target {entity_id} has no remote id yet"
                    )));
                };
                self.remote.update_event(&remote_id, doc).await?;
                self.events
                    .update(&entity_id, |e| e.is_synced = true)
                    .await?;
                Ok(())
            }
            SyncOp::Delete => match self.resolve_remote_id(item).await {
                Some(remote_id) => self.remote.delete_event(&remote_id).await,
                // Never reached the remote store; nothing to delete there.
                None => Ok(()),
            },
        }
    }

    async fn resolve_remote_id(&self, item: &SyncQueueItem) -> Option<String> {
        if let Some(remote_id) = &item.payload.remote_id {
            return Some(remote_id.clone());
        }
        self.events
            .get(&EventId::from(item.entity_id.as_str()))
            .await
            .and_then(|e| e.remote_id)
    }

    /// Merge an inbound remote snapshot (or delta) for one group into the
    /// local store.
    ///
    /// Per document, in load-bearing order: a local tombstone wins
    /// unconditionally (a delete-then-resync race must never resurrect the
    /// event); then strict last-writer-wins on `updated_at` with ties
    /// keeping the local copy; then reconciliation of not-yet-linked local
    /// records (client-id echo first, creation-window heuristic second);
    /// otherwise the document materializes as a new synced local record.
    /// Malformed documents are rejected and skipped, never coerced.
    pub async fn pull_changes(&self, group_id: &str, remote_events: Vec<RemoteEvent>) {
        let locals = self.events.all().await;
        for remote in remote_events {
            let remote_id = remote.remote_id.clone();
            if let Err(error) = self.merge_remote_event(group_id, &locals, remote).await {
                tracing::warn!("pull: skipping remote event {remote_id}: {error}");
            }
        }
    }

    async fn merge_remote_event(
        &self,
        group_id: &str,
        locals: &[Event],
        remote: RemoteEvent,
    ) -> Result<()> {
        let RemoteEvent { remote_id, doc } = remote;

        if let Some(existing) = locals
            .iter()
            .find(|e| e.remote_id.as_deref() == Some(remote_id.as_str()))
        {
            if existing.is_deleted {
                // Local deletion is authoritative; a stale snapshot must not
                // resurrect the event.
                tracing::debug!("pull: {remote_id} is tombstoned locally, skipping");
                return Ok(());
            }
            let remote_updated = doc.updated_instant().unwrap_or_else(Utc::now);
            if remote_updated > existing.updated_at {
                let mut merged = existing.clone();
                doc.merge_into(&mut merged)?;
                self.events.update(&existing.id, |e| *e = merged).await?;
            }
            return Ok(());
        }

        // No local record references this remote id. It may be an event we
        // just created whose snapshot raced ahead of the create's own ack.
        if let Some(local_id) = self.reconcile_unlinked(group_id, locals, &doc) {
            self.events
                .update(&local_id, |e| {
                    e.remote_id = Some(remote_id.clone());
                    e.is_synced = true;
                })
                .await?;
            return Ok(());
        }

        let mut event = doc.into_event(remote_id)?;
        if event.group_id.is_empty() {
            event.group_id = group_id.to_string();
        }
        self.events.add(event).await?;
        Ok(())
    }

    fn reconcile_unlinked(
        &self,
        group_id: &str,
        locals: &[Event],
        doc: &EventDoc,
    ) -> Option<EventId> {
        // The client-id echo is exact: the remote store hands back the id we
        // generated, so no guessing is needed.
        if let Some(client_id) = &doc.client_id {
            let client_id = EventId::from(client_id.as_str());
            if let Some(local) = locals
                .iter()
                .find(|e| e.id == client_id && e.remote_id.is_none())
            {
                return Some(local.id.clone());
            }
        }

        // Fallback for documents written without an echo: a recently created,
        // not-yet-linked record with the same group, title, and start.
        let cutoff = Utc::now() - chrono::Duration::seconds(RECENT_CREATE_WINDOW_SECS);
        locals
            .iter()
            .find(|e| {
                e.group_id == group_id
                    && e.remote_id.is_none()
                    && e.start_date.timestamp_millis() == doc.start_date
                    && e.title == doc.title
                    && e.created_at >= cutoff
            })
            .map(|e| e.id.clone())
    }
}

fn require_doc(item: &SyncQueueItem) -> Result<EventDoc> {
    item.payload.doc.clone().ok_or_else(|| {
        Error::InvalidInput(format!(
            "{:?} queue item {} carries no document",
            item.op, item.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDraft, EventKind};
    use crate::net::Connectivity;
    use crate::remote::MemoryRemote;
    use crate::storage::MemoryKv;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    struct Harness {
        engine: Arc<SyncEngine>,
        events: EventStore,
        queue: SyncQueueStore,
        remote: Arc<MemoryRemote>,
        connectivity: Connectivity,
    }

    fn harness(online: bool) -> Harness {
        let kv = Arc::new(MemoryKv::new());
        let events = EventStore::new(kv.clone());
        let queue = SyncQueueStore::new(kv);
        let remote = Arc::new(MemoryRemote::new());
        let connectivity = Connectivity::new(online);
        let engine = SyncEngine::new(
            events.clone(),
            queue.clone(),
            remote.clone() as Arc<dyn RemoteStore>,
            connectivity.watch(),
        );
        Harness {
            engine,
            events,
            queue,
            remote,
            connectivity,
        }
    }

    fn draft(title: &str) -> EventDraft {
        EventDraft {
            title: title.to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 15, 19, 0, 0).unwrap(),
            group_id: "family".to_string(),
            created_by: "user-1".to_string(),
            ..EventDraft::default()
        }
    }

    async fn seed_event(h: &Harness, title: &str) -> Event {
        let event = Event::from_draft(draft(title)).unwrap();
        h.events.add(event.clone()).await.unwrap();
        event
    }

    #[tokio::test]
    async fn immediate_create_returns_none_offline() {
        let h = harness(false);
        let event = seed_event(&h, "Dinner").await;
        let doc = EventDoc::from_event(&event);

        assert_eq!(h.engine.create_event_immediate(&event.id, doc).await, None);
        let stored = h.events.get(&event.id).await.unwrap();
        assert!(stored.remote_id.is_none());
        assert!(!stored.is_synced);
    }

    #[tokio::test]
    async fn immediate_create_stamps_remote_id() {
        let h = harness(true);
        let event = seed_event(&h, "Dinner").await;
        let doc = EventDoc::from_event(&event);

        let remote_id = h
            .engine
            .create_event_immediate(&event.id, doc)
            .await
            .unwrap();
        let stored = h.events.get(&event.id).await.unwrap();
        assert_eq!(stored.remote_id, Some(remote_id));
        assert!(stored.is_synced);
    }

    #[tokio::test]
    async fn immediate_create_degrades_to_none_on_remote_failure() {
        let h = harness(true);
        h.remote.set_available(false);
        let event = seed_event(&h, "Dinner").await;
        let doc = EventDoc::from_event(&event);

        assert_eq!(h.engine.create_event_immediate(&event.id, doc).await, None);
    }

    #[tokio::test]
    async fn offline_create_drains_after_reconnect() {
        // The end-to-end offline-first path: create while offline, queue,
        // reconnect, drain.
        let h = harness(false);
        let event = seed_event(&h, "Баня").await;
        let doc = EventDoc::from_event(&event);

        h.engine
            .queue_operation(
                SyncOp::Create,
                EntityKind::Event,
                event.id.to_string(),
                ChangePayload {
                    remote_id: None,
                    doc: Some(doc),
                },
            )
            .await
            .unwrap();

        assert_eq!(h.queue.all().await.len(), 1);
        let stored = h.events.get(&event.id).await.unwrap();
        assert!(stored.remote_id.is_none());
        assert!(!stored.is_synced);

        h.connectivity.set_online(true);
        h.engine.sync_pending_changes().await;

        let stored = h.events.get(&event.id).await.unwrap();
        assert!(stored.is_synced);
        assert!(stored.remote_id.is_some());
        assert!(h.queue.all().await.is_empty());
        assert_eq!(h.engine.status(), SyncStatus::Synced);

        let snapshot = h.remote.query_group_events("family").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].doc.title, "Баня");
    }

    #[tokio::test]
    async fn drain_is_skipped_entirely_while_offline() {
        let h = harness(false);
        let event = seed_event(&h, "Dinner").await;
        h.engine
            .queue_operation(
                SyncOp::Create,
                EntityKind::Event,
                event.id.to_string(),
                ChangePayload {
                    remote_id: None,
                    doc: Some(EventDoc::from_event(&event)),
                },
            )
            .await
            .unwrap();

        h.engine.sync_pending_changes().await;
        assert_eq!(h.engine.status(), SyncStatus::Offline);
        assert_eq!(h.queue.all().await[0].retry_count, 0);
    }

    #[tokio::test]
    async fn failed_items_retry_up_to_the_ceiling() {
        let h = harness(true);
        h.remote.set_available(false);
        let event = seed_event(&h, "Dinner").await;
        h.queue
            .add(SyncQueueItem::new(
                SyncOp::Create,
                EntityKind::Event,
                event.id.to_string(),
                ChangePayload {
                    remote_id: None,
                    doc: Some(EventDoc::from_event(&event)),
                },
            ))
            .await
            .unwrap();

        for expected in 1..=5u32 {
            h.engine.sync_pending_changes().await;
            assert_eq!(h.queue.all().await[0].retry_count, expected);
        }

        // At the ceiling the item is retained but no longer touched.
        h.engine.sync_pending_changes().await;
        let items = h.queue.all().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].retry_count, 5);
    }

    #[tokio::test]
    async fn update_queued_behind_create_lands_in_one_drain() {
        let h = harness(false);
        let event = seed_event(&h, "Dinner").await;
        let create_doc = EventDoc::from_event(&event);
        let mut update_doc = create_doc.clone();
        update_doc.title = "Dinner out".to_string();

        for (op, doc) in [(SyncOp::Create, create_doc), (SyncOp::Update, update_doc)] {
            h.queue
                .add(SyncQueueItem::new(
                    op,
                    EntityKind::Event,
                    event.id.to_string(),
                    ChangePayload {
                        remote_id: None,
                        doc: Some(doc),
                    },
                ))
                .await
                .unwrap();
        }

        h.connectivity.set_online(true);
        h.engine.sync_pending_changes().await;

        assert!(h.queue.all().await.is_empty());
        let snapshot = h.remote.query_group_events("family").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].doc.title, "Dinner out");
    }

    #[tokio::test]
    async fn pull_never_resurrects_local_tombstones() {
        let h = harness(true);
        let event = seed_event(&h, "Dinner").await;
        h.events
            .update(&event.id, |e| {
                e.remote_id = Some("evt-r1".to_string());
                e.is_deleted = true;
            })
            .await
            .unwrap();

        let mut doc = EventDoc::from_event(&event);
        doc.updated_at = Some(Utc::now().timestamp_millis() + 60_000);
        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r1".to_string(),
                    doc,
                }],
            )
            .await;

        let stored = h.events.get(&event.id).await.unwrap();
        assert!(stored.is_deleted);
        assert_eq!(h.events.all().await.len(), 1);
    }

    #[tokio::test]
    async fn pull_applies_only_strictly_newer_remote_state() {
        let h = harness(true);
        let event = seed_event(&h, "Dinner").await;
        h.events
            .update(&event.id, |e| e.remote_id = Some("evt-r1".to_string()))
            .await
            .unwrap();
        let local = h.events.get(&event.id).await.unwrap();

        // Older remote copy: local wins.
        let mut stale = EventDoc::from_event(&local);
        stale.title = "Stale".to_string();
        stale.updated_at = Some(local.updated_at.timestamp_millis() - 60_000);
        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r1".to_string(),
                    doc: stale,
                }],
            )
            .await;
        assert_eq!(h.events.get(&event.id).await.unwrap().title, "Dinner");

        // Strictly newer remote copy: remote wins.
        let mut newer = EventDoc::from_event(&local);
        newer.title = "Fresh".to_string();
        newer.updated_at = Some(local.updated_at.timestamp_millis() + 60_000);
        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r1".to_string(),
                    doc: newer,
                }],
            )
            .await;
        let stored = h.events.get(&event.id).await.unwrap();
        assert_eq!(stored.title, "Fresh");
        assert!(stored.is_synced);
    }

    #[tokio::test]
    async fn pull_adopts_remote_id_via_client_id_echo() {
        let h = harness(true);
        let event = seed_event(&h, "Dinner").await;
        let doc = EventDoc::from_event(&event);

        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r9".to_string(),
                    doc,
                }],
            )
            .await;

        let all = h.events.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].remote_id.as_deref(), Some("evt-r9"));
        assert!(all[0].is_synced);
    }

    #[tokio::test]
    async fn pull_suppresses_duplicates_via_creation_heuristic() {
        let h = harness(true);
        let event = seed_event(&h, "Dinner").await;

        // A foreign writer's document: no client id, but same group, title,
        // and start, arriving within the creation window.
        let mut doc = EventDoc::from_event(&event);
        doc.client_id = None;
        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r2".to_string(),
                    doc,
                }],
            )
            .await;

        let all = h.events.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, event.id);
        assert_eq!(all[0].remote_id.as_deref(), Some("evt-r2"));
    }

    #[tokio::test]
    async fn pull_materializes_unknown_remote_events() {
        let h = harness(true);
        let foreign = Event::from_draft(draft("Brought by bot")).unwrap();
        let mut doc = EventDoc::from_event(&foreign);
        doc.client_id = None;

        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r3".to_string(),
                    doc,
                }],
            )
            .await;

        let all = h.events.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Brought by bot");
        assert_eq!(all[0].remote_id.as_deref(), Some("evt-r3"));
        assert!(all[0].is_synced);
    }

    #[tokio::test]
    async fn pull_rejects_malformed_documents() {
        let h = harness(true);
        let foreign = Event::from_draft(draft("Broken")).unwrap();
        let mut doc = EventDoc::from_event(&foreign);
        doc.client_id = None;
        doc.end_date = doc.start_date;

        h.engine
            .pull_changes(
                "family",
                vec![RemoteEvent {
                    remote_id: "evt-r4".to_string(),
                    doc,
                }],
            )
            .await;

        assert!(h.events.all().await.is_empty());
    }

    #[tokio::test]
    async fn status_subscription_sees_current_value_immediately() {
        let h = harness(false);
        let rx = h.engine.subscribe();
        assert_eq!(*rx.borrow(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn group_items_drain_as_noop_propagations() {
        let h = harness(true);
        h.queue
            .add(SyncQueueItem::new(
                SyncOp::Update,
                EntityKind::Group,
                "family".to_string(),
                ChangePayload::default(),
            ))
            .await
            .unwrap();

        h.engine.sync_pending_changes().await;
        assert!(h.queue.all().await.is_empty());
        assert_eq!(h.engine.status(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn recurring_events_roundtrip_through_the_wire() {
        use crate::models::{Frequency, RecurrenceRule};

        let h = harness(true);
        let mut input = draft("Swim practice");
        input.kind = EventKind::Recurring;
        let mut rule = RecurrenceRule::new(Frequency::Weekly, 1);
        rule.end_date = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        input.recurrence = Some(rule.clone());
        let event = Event::from_draft(input).unwrap();
        h.events.add(event.clone()).await.unwrap();

        h.engine
            .create_event_immediate(&event.id, EventDoc::from_event(&event))
            .await
            .unwrap();

        let snapshot = h.remote.query_group_events("family").await.unwrap();
        let pulled_rule = snapshot[0].doc.recurrence.clone().unwrap();
        assert_eq!(pulled_rule.frequency, Frequency::Weekly);
        assert_eq!(
            pulled_rule.end_date,
            rule.end_date.map(|d| d.timestamp_millis())
        );
    }
}
