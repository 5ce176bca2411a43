//! Remote document store boundary.
//!
//! The core never talks to a concrete backend; it consumes this narrow
//! surface. [`MemoryRemote`] is the in-process implementation used by tests
//! and by clients running without a configured backend.

mod memory;
mod wire;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use memory::MemoryRemote;
pub use wire::{EventDoc, RecurrenceDoc};

use crate::error::Result;

/// An event document paired with its remote id.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub remote_id: String,
    pub doc: EventDoc,
}

/// Narrow create/update/delete/query/subscribe surface of the shared store.
///
/// Implementations stamp `created_at`/`updated_at` server-side on writes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document and return its remote id.
    async fn create_event(&self, doc: EventDoc) -> Result<String>;

    /// Replace the document stored under `remote_id`.
    async fn update_event(&self, remote_id: &str, doc: EventDoc) -> Result<()>;

    /// Delete the document stored under `remote_id`.
    async fn delete_event(&self, remote_id: &str) -> Result<()>;

    /// Fetch the current snapshot of a group's events.
    async fn query_group_events(&self, group_id: &str) -> Result<Vec<RemoteEvent>>;

    /// Subscribe to full-snapshot pushes for a group.
    async fn subscribe_group_events(&self, group_id: &str) -> broadcast::Receiver<Vec<RemoteEvent>>;
}
