use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::Engine;

/// Grace period before the startup change, so the desktop can settle
const START_DELAY: Duration = Duration::from_secs(5);

/// Time still to wait before the next periodic change is allowed.
///
/// `None` means a change is due now. No recorded change counts as due.
pub fn remaining_wait(
    last_change: Option<Instant>,
    now: Instant,
    interval: Duration,
) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(last_change?);
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

impl Engine {
    /// Periodic change loop.
    ///
    /// The interval is re-read from the latest snapshot on every iteration, so
    /// a reload takes effect on the next wake-up.
    pub(crate) async fn run_change_loop(self: Arc<Self>) {
        log::info!("Change scheduler started");

        if self.snapshot().config.general.change_on_start {
            self.change_event.wait_timeout(START_DELAY).await;
            if !self.is_running() {
                log::info!("Change scheduler stopped");
                return;
            }
            log::info!("Changing wallpaper on start");
            self.change_in_background().await;
        }

        while self.is_running() {
            let interval = self.snapshot().config.change_interval();
            self.change_event.wait_timeout(interval).await;
            if !self.is_running() {
                break;
            }
            if !self.changes_enabled() {
                continue;
            }

            // Woken early (manual change, reload, resume): keep the spacing
            loop {
                let interval = self.snapshot().config.change_interval();
                let Some(remaining) = remaining_wait(self.last_change(), Instant::now(), interval)
                else {
                    break;
                };
                log::debug!("Next change in {:.1}s", remaining.as_secs_f32());
                self.change_event.wait_timeout(remaining).await;
                if !self.is_running() {
                    log::info!("Change scheduler stopped");
                    return;
                }
            }

            if self.changes_enabled() {
                log::info!("Scheduled wallpaper change");
                self.change_in_background().await;
            }
        }

        log::info!("Change scheduler stopped");
    }

    async fn change_in_background(self: &Arc<Self>) {
        let engine = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || engine.trigger_change()).await {
            log::error!("Change task failed: {}", e);
        }
    }

    /// Periodic download loop. Each round asks one random downloader for one image.
    pub(crate) async fn run_download_loop(self: Arc<Self>) {
        log::info!("Download scheduler started");

        while self.is_running() {
            let interval = self.snapshot().config.download_interval();
            self.download_event.wait_timeout(interval).await;
            if !self.is_running() {
                break;
            }

            let snapshot = self.snapshot();
            if !snapshot.config.general.download_enabled {
                continue;
            }
            let Some(downloader) = snapshot.sources.downloaders.choose(&mut rand::rng()).cloned()
            else {
                continue;
            };

            log::info!("Downloading an image with {}", downloader.identity());
            match tokio::task::spawn_blocking(move || downloader.fetch_one()).await {
                Ok(Ok(())) => log::debug!("Download finished"),
                Ok(Err(e)) => log::error!("Download failed: {:#}", e),
                Err(e) => log::error!("Download task failed: {}", e),
            }
        }

        log::info!("Download scheduler stopped");
    }
}
