//! Listener trait and the stock listener adapters.

use crate::MonitorEvent;
use std::fmt;
use tokio::sync::broadcast;

/// Receives monitor events.
///
/// Listeners are called synchronously on the thread that raised the event,
/// after the monitor has released its internal lock. A listener may call
/// back into the monitor; events raised by such calls are delivered after
/// the current one.
pub trait MonitorListener: Send + Sync {
    fn on_event(&self, event: &MonitorEvent);
}

/// Adapts a closure into a [`MonitorListener`].
pub struct FnListener<F>(F);

impl<F> FnListener<F>
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MonitorListener for FnListener<F>
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: &MonitorEvent) {
        (self.0)(event)
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnListener")
    }
}

/// Forwards every event into a `tokio` broadcast channel.
///
/// Sending never blocks. If no receivers are connected the event is
/// dropped; a receiver that falls more than `capacity` events behind
/// observes `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<MonitorEvent>,
}

impl BroadcastListener {
    /// Create a listener and its first receiver.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<MonitorEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Attach another receiver. It sees only events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl MonitorListener for BroadcastListener {
    fn on_event(&self, event: &MonitorEvent) {
        let event_type = event.event_type();
        match self.tx.send(event.clone()) {
            Ok(receivers) => {
                tracing::trace!(event_type, receivers, "Broadcast monitor event");
            }
            Err(_) => {
                tracing::trace!(event_type, "No receivers for monitor event");
            }
        }
    }
}
