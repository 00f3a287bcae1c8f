//! TASKMON Log - Task Message Log
//!
//! The append-only message log shared by every activity of a task:
//! arrival filtering, monotonic sequencing, capacity eviction, running
//! error/warning counters and exception folding.

mod exception;
mod filter;
mod log;

pub use exception::build_exception;
pub use filter::MessageFilter;
pub use log::{AppendOutcome, MessageLog};
