use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default notification channel for leadership announcements.
pub const LEADERSHIP_CHANNEL: &str = "tenure_leadership";

/// A point-in-time leadership-state change, delivered to every active
/// subscription of an elector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Whether the local elector holds leadership.
    pub is_leader: bool,
    /// When the state change was observed.
    pub timestamp: DateTime<Utc>,
}

/// Action announced on the leadership channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadershipAction {
    /// A leader voluntarily released its lease.
    Resigned,
    /// Any action this version does not understand.
    #[serde(other)]
    Unknown,
}

/// Wire payload announced on the leadership channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadershipEvent {
    /// Namespace the announcement is scoped to.
    pub name: String,
    /// Identity of the announcing process.
    pub leader_id: String,
    /// What happened.
    pub action: LeadershipAction,
}

impl LeadershipEvent {
    /// Build a resignation announcement.
    pub fn resigned(name: impl Into<String>, leader_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            leader_id: leader_id.into(),
            action: LeadershipAction::Resigned,
        }
    }
}
