use std::sync::Weak;

use tokio::sync::{mpsc, Mutex};

use tenure_core::leadership::Notification;

use super::ElectorState;

/// A handle to leadership-change notifications from one elector.
///
/// The channel holds a single slot and is seeded with the elector's state at
/// subscribe time, so the first [`recv`](Self::recv) always reflects that
/// snapshot. A subscriber that drains at least once per leadership
/// transition never blocks the elector; one that never drains eventually
/// stalls every transition for all subscribers.
pub struct Subscription {
    pub(super) handle: u64,
    pub(super) rx: mpsc::Receiver<Notification>,
    pub(super) state: Weak<Mutex<ElectorState>>,
    pub(super) unlistened: bool,
}

impl Subscription {
    /// Receive the next leadership notification.
    ///
    /// Returns `None` once the subscription has been unlistened and the
    /// slot is drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Receive without waiting, if a notification is pending.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Remove this subscription from its elector's registry.
    ///
    /// Idempotent; only the first call has any effect. Panics if the
    /// registry has no matching entry, which signals a lifecycle bug in the
    /// caller rather than a recoverable condition.
    pub async fn unlisten(&mut self) {
        if self.unlistened {
            return;
        }
        self.unlistened = true;

        // Weak: an unlistened subscription must never keep the elector alive.
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let mut state = state.lock().await;
        let before = state.subscriptions.len();
        state.subscriptions.retain(|entry| entry.handle != self.handle);
        assert!(
            state.subscriptions.len() < before,
            "BUG: tried to unlisten for subscription not in registry"
        );
    }
}
