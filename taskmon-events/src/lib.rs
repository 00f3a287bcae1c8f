//! TASKMON Events - Monitor Event Surface
//!
//! Events raised by a task monitor and the machinery that delivers them.
//!
//! # Delivery
//!
//! ```text
//! monitor call ─→ [state lock] mutate + enqueue ─→ [unlocked] flush ─→ listeners
//!                                                      ↑                  │
//!                                                      └── nested calls ──┘
//! ```
//!
//! Listeners run synchronously, in raise order, outside the monitor's lock,
//! so they may call back into the monitor.
//!
//! # Key Types
//!
//! - `MonitorEvent`: Starting / Started / Finishing / Finished,
//!   ActivityStarted, TaskUpdated, LogUpdated
//! - `MonitorListener`: listener trait, with `FnListener` for closures and
//!   `BroadcastListener` for `tokio` broadcast channels
//! - `EventDispatcher`: subscription registry and ordered outbox

mod dispatch;
mod event;
mod listener;

pub use dispatch::{EventDispatcher, SubscriptionId};
pub use event::MonitorEvent;
pub use listener::{BroadcastListener, FnListener, MonitorListener};

// Re-export the tokio broadcast types used by channel subscribers.
pub use tokio::sync::broadcast;
