//! Shared services consumed by client surfaces.

mod events;

pub use events::EventService;
