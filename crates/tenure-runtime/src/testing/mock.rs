//! In-memory lease store for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tenure_core::error::{Result, TenureError};
use tenure_core::leadership::{Lease, LeaseStore, LeadershipEvent};

use crate::notifier::Notifier;

/// A recorded resignation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResignCall {
    /// Identity that resigned.
    pub leader_id: String,
    /// Namespace resigned from.
    pub name: String,
    /// Channel the announcement was published on.
    pub channel: String,
}

#[derive(Debug, Clone)]
struct MockLease {
    leader_id: String,
    elected_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct MockState {
    leases: HashMap<String, MockLease>,
    fail_elects: u32,
    fail_reelects: u32,
    deny_reelects: bool,
    elect_attempts: u32,
    reelect_attempts: u32,
    resign_calls: Vec<ResignCall>,
}

/// Mock lease store for testing.
///
/// Honors the same TTL semantics as the Postgres store: every claim first
/// drops an expired row for the namespace, and the whole step is atomic
/// (serialized on one lock). Failures can be injected per operation, and a
/// wired [`Notifier`] receives the resignation announcements, mirroring the
/// store's dual-effect resign contract.
pub struct MockLeaseStore {
    state: Mutex<MockState>,
    notifier: Option<Arc<Notifier>>,
}

impl MockLeaseStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            notifier: None,
        }
    }

    /// Wire a notifier so resignations are announced on it.
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Make the next `n` election attempts return an error.
    pub async fn fail_next_elects(&self, n: u32) {
        self.state.lock().await.fail_elects = n;
    }

    /// Make the next `n` reelection attempts return an error.
    pub async fn fail_next_reelects(&self, n: u32) {
        self.state.lock().await.fail_reelects = n;
    }

    /// Make reelection report failure without an error (silent loss).
    pub async fn deny_reelects(&self, deny: bool) {
        self.state.lock().await.deny_reelects = deny;
    }

    /// Number of election attempts seen.
    pub async fn elect_attempts(&self) -> u32 {
        self.state.lock().await.elect_attempts
    }

    /// Number of reelection attempts seen.
    pub async fn reelect_attempts(&self) -> u32 {
        self.state.lock().await.reelect_attempts
    }

    /// Recorded resignation calls.
    pub async fn resign_calls(&self) -> Vec<ResignCall> {
        self.state.lock().await.resign_calls.clone()
    }

    fn expires(ttl: Duration) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(ttl).expect("ttl fits in chrono duration")
    }

    fn drop_expired(state: &mut MockState, name: &str) -> u64 {
        let now = Utc::now();
        match state.leases.get(name) {
            Some(lease) if lease.expires_at <= now => {
                state.leases.remove(name);
                1
            }
            _ => 0,
        }
    }
}

impl Default for MockLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for MockLeaseStore {
    async fn attempt_elect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.elect_attempts += 1;

        if state.fail_elects > 0 {
            state.fail_elects -= 1;
            return Err(TenureError::Database("injected election failure".to_string()));
        }

        Self::drop_expired(&mut state, name);

        if state.leases.contains_key(name) {
            return Ok(false);
        }

        state.leases.insert(
            name.to_string(),
            MockLease {
                leader_id: leader_id.to_string(),
                elected_at: Utc::now(),
                expires_at: Self::expires(ttl),
            },
        );
        Ok(true)
    }

    async fn attempt_reelect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.reelect_attempts += 1;

        if state.fail_reelects > 0 {
            state.fail_reelects -= 1;
            return Err(TenureError::Database("injected reelection failure".to_string()));
        }
        if state.deny_reelects {
            return Ok(false);
        }

        Self::drop_expired(&mut state, name);

        match state.leases.get_mut(name) {
            Some(lease) if lease.leader_id == leader_id => {
                lease.expires_at = Self::expires(ttl);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                // Own lease lapsed but nobody claimed it yet; the claim in
                // the same atomic step wins it back, as in the real store.
                state.leases.insert(
                    name.to_string(),
                    MockLease {
                        leader_id: leader_id.to_string(),
                        elected_at: Utc::now(),
                        expires_at: Self::expires(ttl),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_expired(&self, name: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(Self::drop_expired(&mut state, name))
    }

    async fn resign(&self, leader_id: &str, name: &str, channel: &str) -> Result<bool> {
        let released = {
            let mut state = self.state.lock().await;
            state.resign_calls.push(ResignCall {
                leader_id: leader_id.to_string(),
                name: name.to_string(),
                channel: channel.to_string(),
            });

            match state.leases.get(name) {
                Some(lease) if lease.leader_id == leader_id => {
                    state.leases.remove(name);
                    true
                }
                _ => false,
            }
        };

        if released {
            if let Some(notifier) = &self.notifier {
                notifier.emit(LeadershipEvent::resigned(name, leader_id));
            }
        }

        Ok(released)
    }

    async fn current(&self, name: &str) -> Result<Option<Lease>> {
        let state = self.state.lock().await;
        Ok(state.leases.get(name).map(|lease| Lease {
            name: name.to_string(),
            leader_id: lease.leader_id.clone(),
            elected_at: lease.elected_at,
            expires_at: lease.expires_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_single_winner_among_concurrent_contenders() {
        let store = Arc::new(MockLeaseStore::new());

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .attempt_elect(&format!("worker-{}", i), "default", TTL)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_reelect_only_succeeds_for_holder() {
        let store = MockLeaseStore::new();
        assert!(store.attempt_elect("a", "default", TTL).await.unwrap());

        assert!(!store.attempt_reelect("b", "default", TTL).await.unwrap());
        assert!(store.attempt_reelect("a", "default", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let store = MockLeaseStore::new();
        let short = Duration::from_millis(20);

        assert!(store.attempt_elect("a", "default", short).await.unwrap());
        assert!(!store.attempt_elect("b", "default", TTL).await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.attempt_elect("b", "default", TTL).await.unwrap());
        let lease = store.current("default").await.unwrap().unwrap();
        assert_eq!(lease.leader_id, "b");
    }

    #[tokio::test]
    async fn test_delete_expired_only_removes_lapsed_rows() {
        let store = MockLeaseStore::new();

        assert!(store.attempt_elect("a", "default", TTL).await.unwrap());
        assert_eq!(store.delete_expired("default").await.unwrap(), 0);

        assert!(store
            .attempt_elect("b", "other", Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.delete_expired("other").await.unwrap(), 1);
        assert!(store.current("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resign_releases_and_records() {
        let store = MockLeaseStore::new();
        assert!(store.attempt_elect("a", "default", TTL).await.unwrap());

        assert!(store.resign("a", "default", "tenure_leadership").await.unwrap());
        assert!(store.current("default").await.unwrap().is_none());

        // Resigning a lease we no longer hold is a recorded no-op.
        assert!(!store.resign("a", "default", "tenure_leadership").await.unwrap());
        assert_eq!(store.resign_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MockLeaseStore::new();
        store.fail_next_elects(1).await;

        assert!(store.attempt_elect("a", "default", TTL).await.is_err());
        assert!(store.attempt_elect("a", "default", TTL).await.unwrap());
        assert_eq!(store.elect_attempts().await, 2);
    }
}
