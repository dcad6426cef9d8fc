//! Background tasks.
//!
//! - `deadlines` - inactivity and pending-age timers that auto-end sessions

pub mod deadlines;

pub use deadlines::{start_deadline_worker, DeadlineHandle};
