//! Shared sync state types.

use serde::{Deserialize, Serialize};

/// Unified sync status exposed to every client surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Syncing,
    Error,
    Offline,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Synced => "synced",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Offline => "offline",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_labels() {
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
        assert_eq!(
            serde_json::to_string(&SyncStatus::Syncing).unwrap(),
            "\"syncing\""
        );
    }
}
