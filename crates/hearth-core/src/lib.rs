//! hearth-core - Core library for Hearth
//!
//! This crate contains the shared models, local storage, and the
//! offline-first sync engine used by all Hearth interfaces (mobile, CLI,
//! bot front-ends).

pub mod config;
pub mod error;
pub mod expand;
pub mod models;
pub mod net;
pub mod notify;
pub mod remote;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Event, EventId};
pub use state::SyncStatus;
