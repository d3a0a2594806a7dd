use chrono::{DateTime, Utc};

/// A leadership lease row.
///
/// The store guarantees at most one non-expired lease per namespace; the
/// elector never enforces this itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Namespace the lease is held for.
    pub name: String,
    /// Identity of the holder.
    pub leader_id: String,
    /// When leadership was acquired.
    pub elected_at: DateTime<Utc>,
    /// When the lease expires unless renewed.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Check whether the lease has lapsed.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
