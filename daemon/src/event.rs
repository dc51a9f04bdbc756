use std::time::Duration;
use tokio::sync::Notify;

/// Wake-up signal for a single background task.
///
/// `set` is remembered until the next wait consumes it, so a signal sent while
/// the task is busy still wakes it on its next `wait_timeout`.
#[derive(Debug, Default)]
pub struct Event {
    notify: Notify,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.notify.notify_one();
    }

    /// Wait until signaled or until `timeout` elapses.
    ///
    /// Returns `true` when woken by a signal.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}
