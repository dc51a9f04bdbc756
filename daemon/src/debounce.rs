//! Cancel-and-replace delayed actions.
//!
//! Each request cancels the pending timer and starts a new one, so a burst of
//! requests results in a single action run with the last requested value.
//! Actions never overlap: one that fired while an older action was still
//! running waits for it, and is skipped if a newer request arrived meanwhile.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::locked;

/// Delay before a requested wallpaper is actually applied
pub const APPLY_DELAY: Duration = Duration::from_millis(200);

/// Delay before a scroll step is turned into navigation
pub const SCROLL_DELAY: Duration = Duration::from_millis(100);

pub struct Debouncer<T> {
    delay: Duration,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
    latest: Arc<AtomicU64>,
    running: Arc<Mutex<()>>,
    _value: PhantomData<fn(T)>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer bound to the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            runtime: Handle::current(),
            pending: Mutex::new(None),
            latest: Arc::new(AtomicU64::new(0)),
            running: Arc::new(Mutex::new(())),
            _value: PhantomData,
        }
    }

    /// Schedule `action(value)` after the delay, replacing any pending request.
    ///
    /// The action runs on the blocking pool. An action already running is
    /// not interrupted, but the newer one only starts after it finished.
    pub fn request<F>(&self, value: T, action: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut pending = locked!(self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;

        let delay = self.delay;
        let latest = self.latest.clone();
        let running = self.running.clone();
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let result = tokio::task::spawn_blocking(move || {
                let _running = locked!(running);
                if latest.load(Ordering::Acquire) != generation {
                    log::debug!("Skipping superseded request");
                    return;
                }
                action(value);
            })
            .await;
            if let Err(e) = result {
                log::error!("Debounced action failed: {}", e);
            }
        }));
    }

    /// Drop the pending request, if any
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
        if let Some(previous) = locked!(self.pending).take() {
            previous.abort();
        }
    }
}
