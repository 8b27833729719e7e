//! Cancel-after-inactivity timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ActivityUpdater;

/// Stand-in deadline for timeouts too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Saturating conversion, so sub-millisecond timeouts keep their length.
fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct Shared {
    origin: Instant,
    /// Nanoseconds since `origin` of the last recorded activity.
    last_activity_ns: AtomicU64,
    timeout_ns: AtomicU64,
    changed: Notify,
    token: CancellationToken,
}

impl Shared {
    fn now_ns(&self) -> u64 {
        nanos(self.origin.elapsed())
    }

    fn deadline(&self) -> Instant {
        let last = self.last_activity_ns.load(Ordering::Acquire);
        let timeout = self.timeout_ns.load(Ordering::Acquire);
        let offset = Duration::from_nanos(last.saturating_add(timeout));
        self.origin
            .checked_add(offset)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }
}

/// Cancels a token once no activity was recorded for the current timeout.
///
/// Clones share the same timer.
#[derive(Debug, Clone)]
pub struct ActivityTimer {
    shared: Arc<Shared>,
}

impl ActivityTimer {
    /// Start watching. A zero `timeout` cancels `token` right away.
    pub fn start(token: CancellationToken, timeout: Duration) -> Self {
        let shared = Arc::new(Shared {
            origin: Instant::now(),
            last_activity_ns: AtomicU64::new(0),
            timeout_ns: AtomicU64::new(nanos(timeout)),
            changed: Notify::new(),
            token,
        });

        if timeout.is_zero() {
            shared.token.cancel();
        } else {
            tokio::spawn(watch(shared.clone()));
        }

        Self { shared }
    }

    /// Record activity now.
    pub fn update(&self) {
        let now = self.shared.now_ns();
        self.shared.last_activity_ns.fetch_max(now, Ordering::AcqRel);
    }

    /// Replace the timeout.
    ///
    /// The quiet window restarts at the moment of the change, so time already
    /// spent idle under the previous timeout is not charged to the new one.
    /// Zero cancels immediately. No-op once the timer fired.
    pub fn set_timeout(&self, timeout: Duration) {
        if self.shared.token.is_cancelled() {
            return;
        }
        if timeout.is_zero() {
            self.shared.token.cancel();
            return;
        }

        self.shared
            .timeout_ns
            .store(nanos(timeout), Ordering::Release);
        self.update();
        self.shared.changed.notify_one();
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.shared.timeout_ns.load(Ordering::Acquire))
    }

    /// Whether the token this timer guards has been cancelled, by it or anyone else.
    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }
}

impl ActivityUpdater for ActivityTimer {
    fn update(&self) {
        ActivityTimer::update(self);
    }
}

async fn watch(shared: Arc<Shared>) {
    loop {
        let deadline = shared.deadline();
        tokio::select! {
            _ = shared.token.cancelled() => return,
            _ = shared.changed.notified() => continue,
            _ = tokio::time::sleep_until(deadline) => {
                // Activity may have moved the deadline while we slept.
                if Instant::now() >= shared.deadline() {
                    tracing::debug!(
                        timeout_ms = shared.timeout_ns.load(Ordering::Acquire) / 1_000_000,
                        "Inactivity timeout reached, cancelling"
                    );
                    shared.token.cancel();
                    return;
                }
            }
        }
    }
}
