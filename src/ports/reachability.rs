use tokio::sync::watch;

/// Port for network reachability monitoring.
///
/// Implementations emit the current connectivity as a boolean on every
/// state transition. The orchestrator subscribes and drains its offline
/// queue when the signal flips to connected.
pub trait ReachabilityMonitor: Send + Sync {
    /// Subscribe to connectivity transitions.
    ///
    /// The receiver observes the current value immediately and every
    /// subsequent change.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Current connectivity state.
    fn is_connected(&self) -> bool;
}
