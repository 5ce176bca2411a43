//! Event aggregation facade.
//!
//! The surface the presentation layer talks to: owns the in-memory event
//! cache for the active group scope, fans mutations out to the local store
//! and the sync engine, and answers day/range queries through recurrence
//! expansion. The cache is single-writer (`reload` replaces it wholesale)
//! and read-only to consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::expand::{expand_event, occurrence_start};
use crate::models::{
    end_of_day, start_of_day, ChangePayload, EntityKind, Event, EventDraft, EventId, EventKind,
    EventPatch, SyncOp,
};
use crate::notify::{
    created_message, deleted_message, notification_recipients, plan_reminder, updated_message,
    MessageSender, ReminderScheduler,
};
use crate::remote::{EventDoc, RemoteEvent, RemoteStore};
use crate::state::SyncStatus;
use crate::storage::EventStore;
use crate::sync::SyncEngine;

/// Delay before the single retry of a failed initial pull.
const INITIAL_PULL_RETRY_MS: u64 = 1500;

pub struct EventService {
    config: CalendarConfig,
    store: EventStore,
    engine: Arc<SyncEngine>,
    remote: Arc<dyn RemoteStore>,
    sender: Option<Arc<dyn MessageSender>>,
    reminders: Option<Arc<dyn ReminderScheduler>>,
    cache: RwLock<Vec<Event>>,
}

impl EventService {
    pub fn new(
        config: CalendarConfig,
        store: EventStore,
        engine: Arc<SyncEngine>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            engine,
            remote,
            sender: None,
            reminders: None,
            cache: RwLock::new(Vec::new()),
        })
    }

    /// Attach an outbound messaging surface for group notifications.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Attach an external reminder scheduler.
    #[must_use]
    pub fn with_reminders(mut self, reminders: Arc<dyn ReminderScheduler>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    /// Rebuild the cache from the local store: live events in the active
    /// group scope.
    pub async fn reload(&self) {
        let groups = self.config.group_scope();
        let events: Vec<Event> = self
            .store
            .all()
            .await
            .into_iter()
            .filter(|e| !e.is_deleted && groups.contains(&e.group_id))
            .collect();
        *self.cache.write().await = events;
    }

    /// Snapshot of the cached live events.
    pub async fn events(&self) -> Vec<Event> {
        self.cache.read().await.clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.engine.status()
    }

    /// Create an event: optimistic local write, immediate remote attempt,
    /// queued fallback. Validation failures reject before anything is
    /// written.
    pub async fn add_event(&self, mut draft: EventDraft) -> Result<Event> {
        if draft.group_id.is_empty() {
            draft.group_id = self.config.group_id.clone();
        }
        if draft.created_by.is_empty() {
            draft.created_by = self.config.user_id.clone();
        }
        let event = Event::from_draft(draft)?;
        self.store.add(event.clone()).await?;
        self.reload().await;

        let doc = EventDoc::from_event(&event);
        if self
            .engine
            .create_event_immediate(&event.id, doc.clone())
            .await
            .is_none()
        {
            self.engine
                .queue_operation(
                    SyncOp::Create,
                    EntityKind::Event,
                    event.id.to_string(),
                    ChangePayload {
                        remote_id: None,
                        doc: Some(doc),
                    },
                )
                .await?;
        }
        self.reload().await;

        self.schedule_reminder(&event).await;
        self.notify_group(created_message(self.actor(), &event)).await;

        Ok(self.store.get(&event.id).await.unwrap_or(event))
    }

    /// Merge a partial update, mark the record unsynced, and queue the
    /// propagation.
    pub async fn update_event(&self, id: &EventId, patch: EventPatch) -> Result<Event> {
        let before = self
            .store
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut preview = before.clone();
        patch.apply(&mut preview);
        preview.validate()?;

        let updated = self
            .store
            .update(id, |e| {
                patch.apply(e);
                e.is_synced = false;
            })
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.reload().await;

        self.engine
            .queue_operation(
                SyncOp::Update,
                EntityKind::Event,
                id.to_string(),
                ChangePayload {
                    remote_id: updated.remote_id.clone(),
                    doc: Some(EventDoc::from_event(&updated)),
                },
            )
            .await?;

        if patch.start_date.is_some()
            || patch.title.is_some()
            || patch.reminder_minutes.is_some()
        {
            self.cancel_reminder(id).await;
            self.schedule_reminder(&updated).await;
        }
        self.notify_group(updated_message(self.actor(), &before, &updated))
            .await;

        Ok(updated)
    }

    /// Delete an event, tombstone-first.
    ///
    /// A derived instance id resolves to its base: with
    /// `delete_entire_series` the base is tombstoned, otherwise only that
    /// occurrence is excluded from future expansion.
    pub async fn delete_event(&self, id: &EventId, delete_entire_series: bool) -> Result<()> {
        if self.store.get(id).await.is_some() {
            return self.tombstone(id).await;
        }
        let Some((base_id, index)) = id.as_instance() else {
            return Err(Error::NotFound(id.to_string()));
        };
        if delete_entire_series {
            return self.tombstone(&base_id).await;
        }
        let base = self
            .store
            .get(&base_id)
            .await
            .ok_or_else(|| Error::NotFound(base_id.to_string()))?;
        let occurrence = occurrence_start(&base, index).ok_or_else(|| {
            Error::InvalidInput(format!("event {base_id} has no occurrence {index}"))
        })?;
        self.delete_occurrence(&base_id, occurrence).await
    }

    /// Exclude a single occurrence of a recurring event and propagate the
    /// changed rule.
    pub async fn delete_occurrence(
        &self,
        base_id: &EventId,
        occurrence: DateTime<Utc>,
    ) -> Result<()> {
        let base = self
            .store
            .get(base_id)
            .await
            .ok_or_else(|| Error::NotFound(base_id.to_string()))?;
        if base.kind != EventKind::Recurring || base.recurrence.is_none() {
            return Err(Error::InvalidInput(format!(
                "event {base_id} is not recurring"
            )));
        }

        let updated = self
            .store
            .update(base_id, |e| {
                if let Some(rule) = e.recurrence.as_mut() {
                    rule.exclude(occurrence);
                }
                e.is_synced = false;
            })
            .await?
            .ok_or_else(|| Error::NotFound(base_id.to_string()))?;
        self.reload().await;

        self.engine
            .queue_operation(
                SyncOp::Update,
                EntityKind::Event,
                base_id.to_string(),
                ChangePayload {
                    remote_id: updated.remote_id.clone(),
                    doc: Some(EventDoc::from_event(&updated)),
                },
            )
            .await?;
        Ok(())
    }

    async fn tombstone(&self, id: &EventId) -> Result<()> {
        let event = self
            .store
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        // Local deletion always lands first, whatever the network does.
        self.store
            .update(id, |e| {
                e.is_deleted = true;
                e.is_synced = false;
            })
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.reload().await;

        match &event.remote_id {
            Some(remote_id) => {
                if !self.engine.delete_event_immediate(remote_id).await {
                    self.engine
                        .queue_operation(
                            SyncOp::Delete,
                            EntityKind::Event,
                            id.to_string(),
                            ChangePayload {
                                remote_id: Some(remote_id.clone()),
                                doc: None,
                            },
                        )
                        .await?;
                }
            }
            None => {
                // Never synced: cancel the pending create/update chain so the
                // drain cannot materialize a remote copy of a deleted event.
                let dropped = self
                    .engine
                    .cancel_pending(id.as_str(), &[SyncOp::Create, SyncOp::Update])
                    .await?;
                if dropped > 0 {
                    tracing::debug!("cancelled {dropped} pending sync items for deleted {id}");
                }
            }
        }

        self.cancel_reminder(id).await;
        self.notify_group(deleted_message(self.actor(), &event)).await;
        Ok(())
    }

    /// Live event by id; tombstoned records read as absent.
    pub async fn get_event_by_id(&self, id: &EventId) -> Option<Event> {
        self.store.get(id).await.filter(|e| !e.is_deleted)
    }

    /// Events intersecting the window, recurring ones expanded, sorted by
    /// start time.
    pub async fn events_for_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        let cache = self.cache.read().await;
        let mut result = Vec::new();
        for event in cache.iter() {
            if event.kind == EventKind::Recurring && event.recurrence.is_some() {
                result.extend(expand_event(event, start, end));
            } else if event.start_date >= start && event.start_date <= end {
                result.push(event.clone());
            }
        }
        drop(cache);
        result.sort_by_key(|e| e.start_date);
        result
    }

    pub async fn events_for_date(&self, date: DateTime<Utc>) -> Vec<Event> {
        self.events_for_range(start_of_day(date), end_of_day(date))
            .await
    }

    /// Drain pending mutations, then refresh the cache.
    pub async fn sync_pending_changes(&self) {
        self.engine.sync_pending_changes().await;
        self.reload().await;
    }

    /// Inbound remote snapshot delivery: merge and refresh.
    pub async fn handle_remote_snapshot(&self, group_id: &str, snapshot: Vec<RemoteEvent>) {
        self.engine.pull_changes(group_id, snapshot).await;
        self.reload().await;
    }

    /// Pull every group in scope once at startup, retrying a failed pull a
    /// single time after a short delay (remote auth can lag right after an
    /// install).
    pub async fn initial_load(&self) {
        for group_id in self.config.group_scope() {
            if !self.try_pull_group(&group_id).await {
                tokio::time::sleep(std::time::Duration::from_millis(INITIAL_PULL_RETRY_MS)).await;
                self.try_pull_group(&group_id).await;
            }
        }
        self.reload().await;
    }

    /// Forced full refetch of every group in scope, for recovery flows.
    /// Unlike `initial_load`, failures propagate.
    pub async fn force_pull(&self) -> Result<()> {
        for group_id in self.config.group_scope() {
            let snapshot = self.remote.query_group_events(&group_id).await?;
            self.engine.pull_changes(&group_id, snapshot).await;
        }
        self.reload().await;
        Ok(())
    }

    /// Subscribe to remote snapshot pushes for every group in scope.
    pub async fn spawn_remote_subscriptions(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for group_id in self.config.group_scope() {
            let service = Arc::clone(self);
            let mut rx = self.remote.subscribe_group_events(&group_id).await;
            handles.push(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(snapshot) => {
                            service.handle_remote_snapshot(&group_id, snapshot).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(
                                "remote subscription for {group_id} lagged by {skipped} snapshots"
                            );
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }
        handles
    }

    async fn try_pull_group(&self, group_id: &str) -> bool {
        match self.remote.query_group_events(group_id).await {
            Ok(snapshot) => {
                self.engine.pull_changes(group_id, snapshot).await;
                true
            }
            Err(error) => {
                tracing::warn!("initial pull for group {group_id} failed: {error}");
                false
            }
        }
    }

    fn actor(&self) -> &str {
        if self.config.user_display_name.is_empty() {
            &self.config.user_id
        } else {
            &self.config.user_display_name
        }
    }

    async fn schedule_reminder(&self, event: &Event) {
        let Some(reminders) = &self.reminders else {
            return;
        };
        let recipients = self.config.messaging_recipients.clone();
        let Some(plan) = plan_reminder(
            event,
            self.config.default_reminder_minutes,
            recipients,
            Utc::now(),
        ) else {
            return;
        };
        if let Err(error) = reminders.schedule(plan).await {
            tracing::warn!("failed to schedule reminder for {}: {error}", event.id);
        }
    }

    async fn cancel_reminder(&self, event_id: &EventId) {
        let Some(reminders) = &self.reminders else {
            return;
        };
        if let Err(error) = reminders.cancel(event_id).await {
            tracing::warn!("failed to cancel reminders for {event_id}: {error}");
        }
    }

    async fn notify_group(&self, message: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        let recipients = notification_recipients(
            &self.config.messaging_recipients,
            self.config.user_messaging_id.as_deref(),
            self.config.notify_own_actions,
        );
        for recipient in recipients {
            if let Err(error) = sender.send(&recipient, &message).await {
                tracing::warn!("failed to notify {recipient}: {error}");
            }
        }
    }
}
