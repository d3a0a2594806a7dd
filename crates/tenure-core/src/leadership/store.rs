use std::time::Duration;

use async_trait::async_trait;

use super::lease::Lease;
use crate::error::Result;

/// The lease store contract consumed by the elector.
///
/// Implementations provide the only cross-process mutual exclusion in the
/// system: `attempt_elect` and `attempt_reelect` must each run their
/// delete-expired-then-claim steps inside a single transaction, so two
/// contenders can never both observe an expired lease and both believe they
/// won.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Atomically claim the lease for `name` if no live lease exists.
    ///
    /// Any expired row for `name` is removed in the same transaction before
    /// the claim. Returns whether `leader_id` was elected.
    async fn attempt_elect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool>;

    /// Extend the lease for `name`, succeeding only while `leader_id` still
    /// holds it. Returns whether the lease was renewed.
    async fn attempt_reelect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool>;

    /// Remove lease rows for `name` that are past expiry. Returns the number
    /// of rows removed.
    async fn delete_expired(&self, name: &str) -> Result<u64>;

    /// Release the lease held by `leader_id` for `name` and announce the
    /// resignation on `channel`. One call, two observable effects; the
    /// announcement is only published when a lease was actually released.
    /// Returns whether a lease was released.
    async fn resign(&self, leader_id: &str, name: &str, channel: &str) -> Result<bool>;

    /// Read the current lease row for `name`, expired or not.
    async fn current(&self, name: &str) -> Result<Option<Lease>>;
}
