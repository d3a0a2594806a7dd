mod subscription;

pub use subscription::Subscription;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use tenure_core::config::ElectionConfig;
use tenure_core::error::{Result, TenureError};
use tenure_core::leadership::{LeadershipAction, LeadershipEvent, LeaseStore, Notification};

use crate::notifier::Notifier;

/// Deadline for a single lease store round-trip.
const STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Consecutive reelection errors tolerated before leadership is considered
/// lost.
const MAX_REELECT_ERRORS: u32 = 5;

/// Resignation attempts made on shutdown before giving up.
const RESIGN_ATTEMPTS: u64 = 10;

/// Fixed delay between failed resignation attempts.
const RESIGN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Elector configuration.
#[derive(Debug, Clone)]
pub struct ElectorConfig {
    /// Identity of this process, unique within the namespace.
    pub id: String,
    /// Namespace shared by all contenders for the same lease.
    pub name: String,
    /// Base period for election retries and reelection.
    pub interval: Duration,
    /// Slack added to the interval to form the lease TTL. Must be non-zero
    /// so renewal precedes expiry under normal timing.
    pub ttl_padding: Duration,
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: "default".to_string(),
            interval: Duration::from_secs(30),
            ttl_padding: Duration::from_secs(10),
        }
    }
}

impl From<&ElectionConfig> for ElectorConfig {
    fn from(config: &ElectionConfig) -> Self {
        Self {
            id: config.id_or_generate(),
            name: config.name.clone(),
            interval: config.interval(),
            ttl_padding: config.ttl_padding(),
        }
    }
}

pub(super) struct SubscriptionEntry {
    pub(super) handle: u64,
    tx: mpsc::Sender<Notification>,
}

#[derive(Default)]
pub(super) struct ElectorState {
    is_leader: bool,
    pub(super) subscriptions: Vec<SubscriptionEntry>,
}

/// Per-process leader elector.
///
/// [`run`](Self::run) loops between seeking (repeated election attempts,
/// woken early by peer resignations) and leading (periodic lease renewal),
/// fanning each transition out to local subscriptions. The lease store is
/// the only cross-process mutual exclusion; the elector itself guards its
/// snapshot and registry with a single mutex.
pub struct Elector {
    store: Arc<dyn LeaseStore>,
    notifier: Arc<Notifier>,
    id: String,
    name: String,
    interval: Duration,
    ttl: Duration,
    state: Arc<Mutex<ElectorState>>,
    subscription_seq: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Elector {
    /// Create a new elector.
    ///
    /// The lease TTL is the interval plus the configured padding, giving the
    /// leader breathing room in its reelection loop before peers consider
    /// the lease expired.
    pub fn new(store: Arc<dyn LeaseStore>, notifier: Arc<Notifier>, config: ElectorConfig) -> Self {
        if config.ttl_padding.is_zero() {
            tracing::warn!(
                "ttl_padding is zero; a slow reelection round will lose leadership for {}",
                config.name
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            store,
            notifier,
            id: config.id,
            name: config.name,
            interval: config.interval,
            ttl: config.interval + config.ttl_padding,
            state: Arc::new(Mutex::new(ElectorState::default())),
            subscription_seq: AtomicU64::new(0),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Identity of this process.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Namespace this elector contends for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current leadership snapshot.
    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.is_leader
    }

    /// Request shutdown of the election loop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the election loop until stopped.
    ///
    /// Whatever the exit cause, a best-effort resignation runs before this
    /// returns, so peers can skip their wait interval instead of waiting
    /// for the lease TTL to lapse.
    pub async fn run(&self) {
        let mut events = self.notifier.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if !self.gain_leadership(&mut events, &mut shutdown_rx).await {
                break;
            }

            self.notify_subscribers(true).await;
            let outcome = self.keep_leadership(&mut events, &mut shutdown_rx).await;
            self.notify_subscribers(false).await;

            match outcome {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!("Error keeping leadership for {}: {}", self.name, e);
                    continue;
                }
            }
        }

        // Runs after the shutdown signal on purpose; see give_up_leadership.
        self.give_up_leadership().await;
    }

    /// Seek leadership until won. Returns false if shutdown was requested.
    async fn gain_leadership(
        &self,
        events: &mut broadcast::Receiver<LeadershipEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            match self.attempt_elect().await {
                Ok(true) => {
                    tracing::info!("Elected leader for {} as {}", self.name, self.id);
                    return true;
                }
                Ok(false) => {}
                // Transient store trouble; the next tick retries.
                Err(e) => tracing::error!("Error attempting election for {}: {}", self.name, e),
            }

            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);
            let mut events_open = true;

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    event = events.recv(), if events_open => match event {
                        Ok(event) if self.is_peer_resignation(&event) => {
                            // Somebody just resigned; contest the next
                            // election immediately.
                            break;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::debug!("Leadership events lagged by {}", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => events_open = false,
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Renew the lease every interval while leading.
    ///
    /// Returns `Ok(())` on shutdown. Returns an error once leadership is
    /// considered lost: [`MAX_REELECT_ERRORS`] consecutive reelection
    /// errors, or a single renewal that reports failure without one.
    async fn keep_leadership(
        &self,
        events: &mut broadcast::Receiver<LeadershipEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let mut consecutive_errors: u32 = 0;
        let mut events_open = true;

        loop {
            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    event = events.recv(), if events_open => match event {
                        // Resignations are only interesting while seeking.
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => events_open = false,
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return Ok(());
                        }
                    }
                }
            }

            match self.attempt_reelect().await {
                Ok(true) => consecutive_errors = 0,
                Ok(false) => return Err(TenureError::LeadershipLost),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_REELECT_ERRORS {
                        return Err(e);
                    }
                    tracing::error!("Error attempting reelection for {}: {}", self.name, e);
                }
            }
        }
    }

    async fn attempt_elect(&self) -> Result<bool> {
        tokio::time::timeout(
            STORE_DEADLINE,
            self.store.attempt_elect(&self.id, &self.name, self.ttl),
        )
        .await
        .map_err(|_| TenureError::Timeout("election attempt exceeded deadline".to_string()))?
    }

    async fn attempt_reelect(&self) -> Result<bool> {
        tokio::time::timeout(
            STORE_DEADLINE,
            self.store.attempt_reelect(&self.id, &self.name, self.ttl),
        )
        .await
        .map_err(|_| TenureError::Timeout("reelection attempt exceeded deadline".to_string()))?
    }

    /// Try up to [`RESIGN_ATTEMPTS`] times to give up any held leadership.
    ///
    /// Failure here is logged and swallowed: an unresigned lease still
    /// becomes reclaimable once its TTL lapses, so resignation only buys
    /// latency for the next election, never correctness.
    async fn give_up_leadership(&self) {
        for attempt in 0..RESIGN_ATTEMPTS {
            match self.attempt_resign(attempt).await {
                Ok(_) => return,
                Err(e) => {
                    tracing::error!("Error attempting to resign {}: {}", self.name, e);
                    tokio::time::sleep(RESIGN_RETRY_DELAY).await;
                }
            }
        }
    }

    /// One resignation attempt, bounded by its own deadline that grows one
    /// second per attempt. Deliberately independent of the shutdown signal
    /// so resignation still runs during a forced exit.
    async fn attempt_resign(&self, attempt: u64) -> Result<bool> {
        let deadline = Duration::from_secs(attempt + 1);
        tokio::time::timeout(
            deadline,
            self.store
                .resign(&self.id, &self.name, self.notifier.channel()),
        )
        .await
        .map_err(|_| TenureError::Timeout("resignation exceeded deadline".to_string()))?
    }

    fn is_peer_resignation(&self, event: &LeadershipEvent) -> bool {
        event.action == LeadershipAction::Resigned && event.name == self.name
    }

    /// Subscribe to leadership changes.
    ///
    /// The returned subscription is seeded with the current leadership state
    /// as of this call, so its first notification always reflects that
    /// snapshot before any later transition.
    pub async fn listen(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(1);
        let handle = self.subscription_seq.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock().await;

        // The slot of a fresh channel is empty, so seeding cannot block.
        let _ = tx.try_send(Notification {
            is_leader: state.is_leader,
            timestamp: Utc::now(),
        });

        state.subscriptions.push(SubscriptionEntry { handle, tx });

        Subscription {
            handle,
            rx,
            state: Arc::downgrade(&self.state),
            unlistened: false,
        }
    }

    /// Fan a leadership change out to every active subscription, in
    /// registration order.
    ///
    /// Each send awaits the subscriber's single slot: a consumer that drains
    /// at least once per transition never blocks the elector, while one that
    /// never drains eventually stalls every transition for all subscribers.
    /// That trade-off is deliberate; see [`listen`](Self::listen).
    async fn notify_subscribers(&self, is_leader: bool) {
        let timestamp = Utc::now();
        let mut state = self.state.lock().await;

        state.is_leader = is_leader;

        for entry in &state.subscriptions {
            let notification = Notification { is_leader, timestamp };
            if entry.tx.send(notification).await.is_err() {
                // Receiver dropped without unlisten; nothing to deliver to.
                tracing::debug!("Subscription {} dropped without unlisten", entry.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::notifier::{Notifier, NotifierConfig};
    use crate::testing::MockLeaseStore;

    fn test_notifier() -> Arc<Notifier> {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        Arc::new(Notifier::new(pool, NotifierConfig::default()))
    }

    fn fast_config(id: &str) -> ElectorConfig {
        ElectorConfig {
            id: id.to_string(),
            name: "default".to_string(),
            interval: Duration::from_millis(30),
            ttl_padding: Duration::from_millis(120),
        }
    }

    fn test_elector(id: &str, store: Arc<MockLeaseStore>, notifier: Arc<Notifier>) -> Arc<Elector> {
        Arc::new(Elector::new(store, notifier, fast_config(id)))
    }

    async fn recv_timeout(sub: &mut Subscription, ms: u64) -> Option<Notification> {
        tokio::time::timeout(Duration::from_millis(ms), sub.recv())
            .await
            .ok()
            .flatten()
    }

    async fn wait_for_leadership(elector: &Elector, ms: u64) -> bool {
        for _ in 0..(ms / 10) {
            if elector.is_leader().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        elector.is_leader().await
    }

    #[tokio::test]
    async fn test_listen_seeds_current_state() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store, test_notifier());

        let mut sub = elector.listen().await;
        let first = sub.try_recv().unwrap();
        assert!(!first.is_leader);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_listen_seeds_leader_state_after_flip() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store, test_notifier());

        elector.notify_subscribers(true).await;

        let mut sub = elector.listen().await;
        assert!(sub.try_recv().unwrap().is_leader);
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_subscription() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store, test_notifier());

        let mut first = elector.listen().await;
        let mut second = elector.listen().await;
        assert!(!first.try_recv().unwrap().is_leader);
        assert!(!second.try_recv().unwrap().is_leader);

        elector.notify_subscribers(true).await;

        assert!(first.try_recv().unwrap().is_leader);
        assert!(second.try_recv().unwrap().is_leader);
    }

    #[tokio::test]
    async fn test_unlisten_is_idempotent() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store, test_notifier());

        let mut sub = elector.listen().await;
        sub.unlisten().await;
        sub.unlisten().await;
        sub.unlisten().await;

        assert!(elector.state.lock().await.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_survives_dropped_receiver() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store, test_notifier());

        let sub = elector.listen().await;
        drop(sub);

        elector.notify_subscribers(true).await;
        assert!(elector.is_leader().await);
    }

    #[tokio::test]
    async fn test_run_elects_and_reports_leadership() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store.clone(), test_notifier());
        let mut sub = elector.listen().await;

        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        assert!(!recv_timeout(&mut sub, 1000).await.unwrap().is_leader);
        assert!(recv_timeout(&mut sub, 1000).await.unwrap().is_leader);
        assert!(elector.is_leader().await);

        let lease = store.current("default").await.unwrap().unwrap();
        assert_eq!(lease.leader_id, "a");

        elector.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_resigns_even_after_shutdown_signal() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store.clone(), test_notifier());

        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });
        assert!(wait_for_leadership(&elector, 1000).await);

        elector.stop();
        task.await.unwrap();

        let calls = store.resign_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].leader_id, "a");
        assert_eq!(calls[0].name, "default");
        assert!(store.current("default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_takeover_after_leader_stops_renewing() {
        let store = Arc::new(MockLeaseStore::new());

        // Simulated fault: a leader that claimed a short lease and died.
        assert!(store
            .attempt_elect("a", "default", Duration::from_millis(150))
            .await
            .unwrap());

        let elector = test_elector("b", store.clone(), test_notifier());
        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        assert!(wait_for_leadership(&elector, 1000).await);
        let lease = store.current("default").await.unwrap().unwrap();
        assert_eq!(lease.leader_id, "b");

        elector.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_resignation_preempts_wait_interval() {
        let notifier = test_notifier();
        let store = Arc::new(MockLeaseStore::new().with_notifier(notifier.clone()));

        assert!(store
            .attempt_elect("a", "default", Duration::from_secs(60))
            .await
            .unwrap());

        // An interval far longer than the test: only the resignation wake-up
        // can let this elector win in time.
        let elector = Arc::new(Elector::new(
            store.clone(),
            notifier.clone(),
            ElectorConfig {
                id: "b".to_string(),
                name: "default".to_string(),
                interval: Duration::from_secs(60),
                ttl_padding: Duration::from_secs(10),
            },
        ));
        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        // Let the first (losing) attempt happen before the resignation.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!elector.is_leader().await);

        assert!(store.resign("a", "default", notifier.channel()).await.unwrap());

        assert!(wait_for_leadership(&elector, 2000).await);

        elector.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_five_reelection_errors_return_to_seeking() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store.clone(), test_notifier());
        let mut sub = elector.listen().await;

        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        assert!(!recv_timeout(&mut sub, 1000).await.unwrap().is_leader);
        assert!(recv_timeout(&mut sub, 1000).await.unwrap().is_leader);

        store.fail_next_reelects(MAX_REELECT_ERRORS).await;

        // Leadership loss fans out false, then seeking wins again.
        assert!(!recv_timeout(&mut sub, 2000).await.unwrap().is_leader);
        assert!(recv_timeout(&mut sub, 2000).await.unwrap().is_leader);

        elector.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_reelection_failure_is_leadership_loss() {
        let store = Arc::new(MockLeaseStore::new());
        let elector = test_elector("a", store.clone(), test_notifier());
        let mut sub = elector.listen().await;

        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        assert!(!recv_timeout(&mut sub, 1000).await.unwrap().is_leader);
        assert!(recv_timeout(&mut sub, 1000).await.unwrap().is_leader);

        store.deny_reelects(true).await;
        assert!(!recv_timeout(&mut sub, 2000).await.unwrap().is_leader);

        store.deny_reelects(false).await;
        let mut regained = false;
        for _ in 0..5 {
            match recv_timeout(&mut sub, 2000).await {
                Some(notification) if notification.is_leader => {
                    regained = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(regained);

        elector.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_election_errors_are_not_fatal() {
        let store = Arc::new(MockLeaseStore::new());
        store.fail_next_elects(2).await;

        let elector = test_elector("a", store.clone(), test_notifier());
        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });

        assert!(wait_for_leadership(&elector, 2000).await);
        assert!(store.elect_attempts().await >= 3);

        elector.stop();
        task.await.unwrap();
    }

    #[test]
    fn test_elector_config_default() {
        let config = ElectorConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.ttl_padding, Duration::from_secs(10));
        assert!(!config.id.is_empty());
    }

    #[test]
    fn test_elector_config_from_election_config() {
        let election = ElectionConfig {
            id: Some("worker-1".to_string()),
            name: "scheduler".to_string(),
            interval_secs: 5,
            ttl_padding_secs: 2,
            ..Default::default()
        };

        let config = ElectorConfig::from(&election);
        assert_eq!(config.id, "worker-1");
        assert_eq!(config.name, "scheduler");
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.ttl_padding, Duration::from_secs(2));
    }
}
