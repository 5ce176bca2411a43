//! Network reachability signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sync::SyncEngine;

/// Process-wide connectivity handle.
///
/// Platform glue (or a test) feeds transitions in through `set_online`;
/// consumers observe through cheap watch receivers.
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        Self {
            tx: watch::channel(initially_online).0,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }

    #[must_use]
    pub fn current(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Watch connectivity transitions and drive the sync engine: one drain per
/// offline→online transition, `offline` status on the way down. Duplicate
/// concurrent drains are prevented by the engine's own drain guard.
pub fn spawn_reachability_monitor(
    engine: Arc<SyncEngine>,
    mut connectivity: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = *connectivity.borrow();
        while connectivity.changed().await.is_ok() {
            let online = *connectivity.borrow();
            if online && !was_online {
                tracing::info!("connectivity regained, draining sync queue");
                engine.sync_pending_changes().await;
            } else if !online && was_online {
                tracing::info!("connectivity lost");
                engine.note_offline();
            }
            was_online = online;
        }
    })
}
