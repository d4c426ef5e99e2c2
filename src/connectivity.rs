//! Connectivity observation.
//!
//! The platform network-status API is an external collaborator. Hosts either
//! implement [`ConnectivityObserver`] directly or feed a [`ConnectivityMonitor`]
//! from their platform callbacks.

use tokio::sync::watch;
use tracing::info;

/// Online/offline source the engine subscribes to.
pub trait ConnectivityObserver: Send + Sync {
    /// Point-in-time check.
    fn is_online(&self) -> bool;

    /// Receiver that changes on every transition edge. Dropping it
    /// unsubscribes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Watch-channel backed observer driven by [`set_online`](Self::set_online).
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Report the platform's current state. Only edges notify subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityObserver for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
        assert!(ConnectivityMonitor::default().is_online());
    }

    #[tokio::test]
    async fn test_subscribers_see_edges_only() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(monitor.is_online());
    }

    #[test]
    fn test_dropping_receiver_unsubscribes() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();
        assert_eq!(monitor.subscriber_count(), 1);
        drop(rx);
        assert_eq!(monitor.subscriber_count(), 0);
    }
}
