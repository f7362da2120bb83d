use tokio::sync::watch;
use tracing::info;

use crate::ports::ReachabilityMonitor;

/// Watch-channel reachability monitor.
///
/// Reference adapter for the reachability port: connectivity is pushed in
/// from outside (an OS path monitor, a health-check loop, or a test) via
/// [`set_connected`](WatchReachabilityMonitor::set_connected) and fanned
/// out to subscribers on every transition.
pub struct WatchReachabilityMonitor {
    tx: watch::Sender<bool>,
}

impl WatchReachabilityMonitor {
    pub fn new(initially_connected: bool) -> Self {
        let (tx, _) = watch::channel(initially_connected);
        Self { tx }
    }

    /// Report the current connectivity state.
    ///
    /// Subscribers are only notified on actual transitions.
    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            info!(connected = connected, "Network reachability changed");
        }
    }
}

impl Default for WatchReachabilityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReachabilityMonitor for WatchReachabilityMonitor {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let monitor = WatchReachabilityMonitor::new(false);
        let mut rx = monitor.subscribe();
        assert!(!*rx.borrow());

        monitor.set_connected(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn test_redundant_reports_do_not_notify() {
        let monitor = WatchReachabilityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_connected(true);
        // No transition happened, so nothing is pending on the channel.
        assert!(!rx.has_changed().unwrap());
    }
}
