//! Signals derived from connection activity.
//!
//! # Responsibilities
//! - Cancel a connection's token after a period without traffic
//! - Let copy loops report traffic without knowing who listens
//!
//! # Design Decisions
//! - Timeout is expressed purely as cancellation; there is no separate
//!   timeout error path.
//! - One watcher task per timer, stopped by the same token it cancels.

pub mod activity;

pub use activity::ActivityTimer;

/// Receives a notification for every chunk of traffic.
pub trait ActivityUpdater: Send + Sync {
    fn update(&self);
}

/// Updater for copy loops nobody watches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActivity;

impl ActivityUpdater for NoActivity {
    fn update(&self) {}
}
