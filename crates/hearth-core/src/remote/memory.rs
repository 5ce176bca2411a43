//! In-process remote store implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::{EventDoc, RemoteEvent, RemoteStore};
use crate::error::{Error, Result};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
struct MemoryState {
    /// remote id -> stored document, in insertion order for stable snapshots
    docs: Vec<(String, EventDoc)>,
    watchers: HashMap<String, broadcast::Sender<Vec<RemoteEvent>>>,
}

/// Remote store held entirely in memory.
///
/// Serves tests and local-only clients; `set_available(false)` simulates an
/// unreachable backend, making every call fail the way a network outage
/// would.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    available: AtomicBool,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated reachability of the backend.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Remote("remote store unavailable".to_string()))
        }
    }

    fn group_snapshot(state: &MemoryState, group_id: &str) -> Vec<RemoteEvent> {
        state
            .docs
            .iter()
            .filter(|(_, doc)| doc.group_id == group_id)
            .map(|(remote_id, doc)| RemoteEvent {
                remote_id: remote_id.clone(),
                doc: doc.clone(),
            })
            .collect()
    }

    fn notify_group(state: &MemoryState, group_id: &str) {
        if let Some(sender) = state.watchers.get(group_id) {
            // Nobody listening is fine; the send result only reports that.
            let _ = sender.send(Self::group_snapshot(state, group_id));
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_event(&self, mut doc: EventDoc) -> Result<String> {
        self.ensure_available()?;
        let remote_id = format!("evt-{}", Uuid::now_v7());
        let now = Utc::now().timestamp_millis();
        doc.created_at = Some(now);
        doc.updated_at = Some(now);

        let mut state = self.state.lock().await;
        let group_id = doc.group_id.clone();
        state.docs.push((remote_id.clone(), doc));
        Self::notify_group(&state, &group_id);
        Ok(remote_id)
    }

    async fn update_event(&self, remote_id: &str, mut doc: EventDoc) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let Some(slot) = state.docs.iter_mut().find(|(id, _)| id == remote_id) else {
            return Err(Error::NotFound(format!("remote event {remote_id}")));
        };
        doc.created_at = slot.1.created_at;
        doc.updated_at = Some(Utc::now().timestamp_millis());
        let group_id = doc.group_id.clone();
        slot.1 = doc;
        Self::notify_group(&state, &group_id);
        Ok(())
    }

    async fn delete_event(&self, remote_id: &str) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let Some(index) = state.docs.iter().position(|(id, _)| id == remote_id) else {
            // Deleting an already-gone document is not an error.
            return Ok(());
        };
        let (_, doc) = state.docs.remove(index);
        Self::notify_group(&state, &doc.group_id);
        Ok(())
    }

    async fn query_group_events(&self, group_id: &str) -> Result<Vec<RemoteEvent>> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(Self::group_snapshot(&state, group_id))
    }

    async fn subscribe_group_events(&self, group_id: &str) -> broadcast::Receiver<Vec<RemoteEvent>> {
        let mut state = self.state.lock().await;
        state
            .watchers
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
