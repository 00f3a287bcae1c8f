//! Ordered, re-entrant event delivery.
//!
//! The monitor queues events while it holds its state lock and flushes the
//! queue after releasing it. Only one flush delivers at a time: a flush that
//! starts while another is running (a listener calling back into the
//! monitor, or a second thread) leaves its events for the running flush,
//! which delivers them after the current event. Global raise order is
//! preserved.

use crate::{MonitorEvent, MonitorListener};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use taskmon_core::{TaskError, TaskResult};

/// Identifies a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<MonitorEvent>,
    delivering: bool,
}

type Registration = (SubscriptionId, Arc<dyn MonitorListener>);

/// Subscription registry plus the ordered outbox.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Registration>>,
    outbox: Mutex<Outbox>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // === Subscriptions ===

    pub fn subscribe(&self, listener: Arc<dyn MonitorListener>) -> TaskResult<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners
            .write()
            .map_err(|_| TaskError::LockPoisoned)?
            .push((id, listener));
        tracing::debug!(subscription = %id, "Listener subscribed");
        Ok(id)
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> TaskResult<bool> {
        let mut listeners = self.listeners.write().map_err(|_| TaskError::LockPoisoned)?;
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        Ok(listeners.len() != before)
    }

    pub fn listener_count(&self) -> TaskResult<usize> {
        Ok(self.listeners.read().map_err(|_| TaskError::LockPoisoned)?.len())
    }

    // === Delivery ===

    /// Queue events for the next flush.
    pub fn enqueue<I>(&self, events: I) -> TaskResult<()>
    where
        I: IntoIterator<Item = MonitorEvent>,
    {
        self.outbox
            .lock()
            .map_err(|_| TaskError::LockPoisoned)?
            .queue
            .extend(events);
        Ok(())
    }

    pub fn pending(&self) -> TaskResult<usize> {
        Ok(self.outbox.lock().map_err(|_| TaskError::LockPoisoned)?.queue.len())
    }

    /// Deliver queued events until the queue is empty.
    ///
    /// Returns immediately if another flush is already delivering; that flush
    /// picks up anything queued meanwhile.
    pub fn flush(&self) -> TaskResult<()> {
        {
            let mut outbox = self.outbox.lock().map_err(|_| TaskError::LockPoisoned)?;
            if outbox.delivering {
                return Ok(());
            }
            outbox.delivering = true;
        }
        let mut guard = DeliveryGuard {
            outbox: &self.outbox,
            armed: true,
        };

        loop {
            let event = {
                let mut outbox = self.outbox.lock().map_err(|_| TaskError::LockPoisoned)?;
                match outbox.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        // Released under the same lock that saw the queue empty.
                        outbox.delivering = false;
                        guard.armed = false;
                        return Ok(());
                    }
                }
            };

            let listeners: Vec<Arc<dyn MonitorListener>> = self
                .listeners
                .read()
                .map_err(|_| TaskError::LockPoisoned)?
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();

            tracing::trace!(
                event_type = event.event_type(),
                listeners = listeners.len(),
                "Dispatching monitor event"
            );
            for listener in &listeners {
                listener.on_event(&event);
            }
        }
    }

    /// Queue and flush in one call.
    pub fn dispatch(&self, event: MonitorEvent) -> TaskResult<()> {
        self.enqueue(std::iter::once(event))?;
        self.flush()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count().unwrap_or_default())
            .field("pending", &self.pending().unwrap_or_default())
            .finish()
    }
}

/// Clears the delivering flag when a flush is cut short by an error or a
/// panicking listener.
struct DeliveryGuard<'a> {
    outbox: &'a Mutex<Outbox>,
    armed: bool,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbox.delivering = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnListener;
    use std::sync::Mutex as StdMutex;
    use taskmon_core::{new_task_id, LogMessage};

    fn log_event(text: &str) -> MonitorEvent {
        MonitorEvent::LogUpdated {
            messages: vec![LogMessage::information(text)],
        }
    }

    fn first_text(event: &MonitorEvent) -> String {
        event
            .messages()
            .first()
            .map(|m| m.message.clone())
            .unwrap_or_else(|| event.event_type().to_string())
    }

    #[test]
    fn test_delivers_in_queue_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher
            .subscribe(Arc::new(FnListener::new(move |e: &MonitorEvent| {
                sink.lock().unwrap().push(first_text(e));
            })))
            .unwrap();

        dispatcher
            .enqueue(vec![log_event("a"), log_event("b"), log_event("c")])
            .unwrap();
        assert_eq!(dispatcher.pending().unwrap(), 3);
        dispatcher.flush().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(dispatcher.pending().unwrap(), 0);
    }

    #[test]
    fn test_reentrant_events_follow_current_event() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let inner = dispatcher.clone();
        let sink = seen.clone();
        dispatcher
            .subscribe(Arc::new(FnListener::new(move |e: &MonitorEvent| {
                let text = first_text(e);
                sink.lock().unwrap().push(text.clone());
                if text == "outer" {
                    inner.dispatch(log_event("nested")).unwrap();
                    sink.lock().unwrap().push("after nested dispatch".to_string());
                }
            })))
            .unwrap();

        dispatcher
            .enqueue(vec![log_event("outer"), log_event("queued")])
            .unwrap();
        dispatcher.flush().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["outer", "after nested dispatch", "queued", "nested"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let id = dispatcher
            .subscribe(Arc::new(FnListener::new(move |_: &MonitorEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();

        dispatcher.dispatch(MonitorEvent::Finishing { task_id: new_task_id() }).unwrap();
        assert!(dispatcher.unsubscribe(id).unwrap());
        assert!(!dispatcher.unsubscribe(id).unwrap());
        dispatcher.dispatch(MonitorEvent::Finishing { task_id: new_task_id() }).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count().unwrap(), 0);
    }

    #[test]
    fn test_listener_panic_does_not_wedge_dispatcher() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let panicky = dispatcher.clone();
        let id = dispatcher
            .subscribe(Arc::new(FnListener::new(|_: &MonitorEvent| panic!("listener failed"))))
            .unwrap();

        let result = std::thread::spawn(move || panicky.dispatch(log_event("x"))).join();
        assert!(result.is_err());

        dispatcher.unsubscribe(id).unwrap();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        dispatcher
            .subscribe(Arc::new(FnListener::new(move |_: &MonitorEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();
        dispatcher.dispatch(log_event("y")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
