//! Data models for Hearth

mod event;
mod participant;
mod queue;
mod recurrence;

pub use event::{
    end_of_day, start_of_day, Event, EventColor, EventDraft, EventId, EventKind, EventPatch,
};
pub use participant::Participant;
pub use queue::{ChangePayload, EntityKind, SyncOp, SyncQueueItem, RETRY_LIMIT};
pub use recurrence::{weekday_ordinal, Frequency, RecurrenceRule};
