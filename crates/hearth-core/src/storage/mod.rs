//! Device-local persistence.
//!
//! Everything durable on the device goes through the narrow [`KeyValueStore`]
//! surface as a serialized list under a fixed key: the event cache and the
//! sync queue. The remote store is the system of record for synced data, so
//! read failures here degrade to empty results instead of propagating.

mod events;
mod kv;
mod queue;

pub use events::EventStore;
pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use queue::SyncQueueStore;
