//! Participant reference model

use serde::{Deserialize, Serialize};

/// Denormalized participant copy attached to an event (not a foreign key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable participant identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Emoji or image URL shown as the avatar
    pub avatar: String,
    /// Hex color for the avatar background
    pub color: String,
}
