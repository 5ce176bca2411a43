//! Client configuration for the calendar core.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notify::DEFAULT_REMINDER_MINUTES;

/// Identity and scope a client runs under.
///
/// `linked_group_ids` covers account-linking transitions where a device
/// briefly needs events from more than one group identifier; queries union
/// the primary group with the linked ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub group_id: String,
    #[serde(default)]
    pub linked_group_ids: Vec<String>,
    pub user_id: String,
    #[serde(default)]
    pub user_display_name: String,
    /// Messaging recipient ids for group notifications.
    #[serde(default)]
    pub messaging_recipients: Vec<String>,
    /// The acting user's own messaging id, filtered from recipients when
    /// `notify_own_actions` is off.
    #[serde(default)]
    pub user_messaging_id: Option<String>,
    #[serde(default = "default_notify_own_actions")]
    pub notify_own_actions: bool,
    #[serde(default = "default_reminder_minutes")]
    pub default_reminder_minutes: u32,
}

impl CalendarConfig {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            linked_group_ids: Vec::new(),
            user_id: user_id.into(),
            user_display_name: String::new(),
            messaging_recipients: Vec::new(),
            user_messaging_id: None,
            notify_own_actions: default_notify_own_actions(),
            default_reminder_minutes: default_reminder_minutes(),
        }
    }

    /// Primary group plus linked groups, deduplicated, order preserved.
    pub fn group_scope(&self) -> Vec<String> {
        let mut scope = vec![self.group_id.clone()];
        for group_id in &self.linked_group_ids {
            if !scope.contains(group_id) {
                scope.push(group_id.clone());
            }
        }
        scope
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_id.trim().is_empty() {
            return Err(Error::InvalidInput("group id must not be empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_notify_own_actions() -> bool {
    true
}

fn default_reminder_minutes() -> u32 {
    DEFAULT_REMINDER_MINUTES
}
