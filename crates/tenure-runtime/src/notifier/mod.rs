use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use tenure_core::error::{Result, TenureError};
use tenure_core::leadership::{LeadershipEvent, LEADERSHIP_CHANNEL};

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// PostgreSQL channel name for leadership announcements.
    pub channel: String,
    /// Buffer size for the event broadcast.
    pub buffer_size: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel: LEADERSHIP_CHANNEL.to_string(),
            buffer_size: 64,
        }
    }
}

/// Listens for leadership announcements via PostgreSQL LISTEN/NOTIFY and
/// fans them out to in-process receivers.
///
/// The listen loop is its own task; electors only ever see events through
/// the broadcast channel.
pub struct Notifier {
    pool: sqlx::PgPool,
    config: NotifierConfig,
    running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<LeadershipEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Notifier {
    /// Create a new notifier.
    pub fn new(pool: sqlx::PgPool, config: NotifierConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            pool,
            config,
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// The channel this notifier is bound to.
    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    /// Subscribe to leadership announcements.
    pub fn subscribe(&self) -> broadcast::Receiver<LeadershipEvent> {
        self.event_tx.subscribe()
    }

    /// Check if the listen loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the listen loop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the listen loop.
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        // Dedicated listener connection outside the pool's checkout flow
        let mut listener = sqlx::postgres::PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| TenureError::Notification(e.to_string()))?;

        listener
            .listen(&self.config.channel)
            .await
            .map_err(|e| TenureError::Notification(e.to_string()))?;

        tracing::info!("Listening for leadership events on channel: {}", self.config.channel);

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                notification = listener.recv() => {
                    match notification {
                        Ok(notification) => {
                            if let Some(event) = self.parse_payload(notification.payload()) {
                                let _ = self.event_tx.send(event);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Error receiving leadership event: {}", e);
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Notifier shutting down");
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Parse a notification payload into a LeadershipEvent.
    fn parse_payload(&self, payload: &str) -> Option<LeadershipEvent> {
        match serde_json::from_str(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Invalid leadership payload {:?}: {}", payload, e);
                None
            }
        }
    }

    /// Manually emit an event (for testing or manual triggering).
    pub fn emit(&self, event: LeadershipEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_core::leadership::LeadershipAction;

    fn notifier() -> Notifier {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        Notifier::new(pool, NotifierConfig::default())
    }

    #[test]
    fn test_notifier_config_default() {
        let config = NotifierConfig::default();
        assert_eq!(config.channel, LEADERSHIP_CHANNEL);
        assert_eq!(config.buffer_size, 64);
    }

    #[tokio::test]
    async fn test_parse_payload_resigned() {
        let notifier = notifier();

        let payload = r#"{"name":"default","leader_id":"worker-1","action":"resigned"}"#;
        let event = notifier.parse_payload(payload).unwrap();

        assert_eq!(event.name, "default");
        assert_eq!(event.leader_id, "worker-1");
        assert_eq!(event.action, LeadershipAction::Resigned);
    }

    #[tokio::test]
    async fn test_parse_payload_invalid() {
        let notifier = notifier();
        assert!(notifier.parse_payload("not json").is_none());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let notifier = notifier();
        let mut rx = notifier.subscribe();

        notifier.emit(LeadershipEvent::resigned("default", "worker-1"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.leader_id, "worker-1");
    }
}
