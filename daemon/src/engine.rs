//! The image rotation engine.
//!
//! Owns the shared state used by the background tasks (prepared buffer,
//! history, configuration snapshot, color cache) and exposes the control
//! operations used by the IPC server. The background loops themselves live in
//! [`crate::preparer`] and [`crate::scheduler`].
//!
//! Locks guard short critical sections only. Filesystem walks, image decoding
//! and external processes always run with no engine lock held.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::color::{ColorExtractor, ColorFilter};
use crate::config::Config;
use crate::debounce::{APPLY_DELAY, Debouncer, SCROLL_DELAY};
use crate::event::Event;
use crate::filters;
use crate::history::History;
use crate::locked;
use crate::origin::{read_origin, sidecar_path};
use crate::preparer::PreparedBuffer;
use crate::sampler::Sampler;
use crate::sources::{DownloaderCache, Sources};
use crate::store::WallpaperStore;

/// Upper bound on fresh images drawn while stepping away from a trashed file
const MAX_TRASH_STEPS: usize = 10;

/// Configuration and everything resolved from it, replaced as one value
pub struct Snapshot {
    pub config: Config,
    pub sources: Sources,
}

/// What is on the desktop right now
#[derive(Debug, Default)]
struct DisplayState {
    current: Option<PathBuf>,
    last_change: Option<Instant>,
    last_change_at: Option<DateTime<Local>>,
}

pub struct Engine {
    snapshot: RwLock<Arc<Snapshot>>,
    downloader_cache: Mutex<DownloaderCache>,
    config_path: Option<PathBuf>,

    pub(crate) prepared: Mutex<PreparedBuffer>,
    history: Mutex<History>,
    display: Mutex<DisplayState>,

    pub(crate) sampler: Sampler,
    pub(crate) color: ColorFilter,
    store: Box<dyn WallpaperStore>,

    running: AtomicBool,
    changes_enabled: AtomicBool,
    pub(crate) change_event: Event,
    pub(crate) prepare_event: Event,
    pub(crate) download_event: Event,

    apply: Debouncer<PathBuf>,
    scroll: Debouncer<bool>,
    started: Instant,
}

impl Engine {
    /// Build an engine from a loaded configuration.
    ///
    /// Reads the desktop's current wallpaper once to seed the history. Must be
    /// called from within a tokio runtime.
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        store: Box<dyn WallpaperStore>,
        extractor: Box<dyn ColorExtractor>,
    ) -> Arc<Self> {
        let mut cache = DownloaderCache::new();
        let sources = Sources::resolve(&config, &mut cache);

        let initial = match store.get_current() {
            Ok(current) => current,
            Err(e) => {
                log::warn!("Could not read the current wallpaper: {:#}", e);
                None
            }
        };
        if let Some(ref path) = initial {
            log::info!("Current wallpaper: {}", path.display());
        }

        let history = History::seeded(initial.clone(), config.general.history_limit);
        let changes_enabled = config.general.change_enabled;

        Arc::new(Self {
            snapshot: RwLock::new(Arc::new(Snapshot { config, sources })),
            downloader_cache: Mutex::new(cache),
            config_path,
            prepared: Mutex::new(PreparedBuffer::default()),
            history: Mutex::new(history),
            display: Mutex::new(DisplayState {
                current: initial,
                ..Default::default()
            }),
            sampler: Sampler::new(),
            color: ColorFilter::new(extractor),
            store,
            running: AtomicBool::new(true),
            changes_enabled: AtomicBool::new(changes_enabled),
            change_event: Event::new(),
            prepare_event: Event::new(),
            download_event: Event::new(),
            apply: Debouncer::new(APPLY_DELAY),
            scroll: Debouncer::new(SCROLL_DELAY),
            started: Instant::now(),
        })
    }

    /// Spawn the preparer, change scheduler and download scheduler
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_preparer()),
            tokio::spawn(self.clone().run_change_loop()),
            tokio::spawn(self.clone().run_download_loop()),
        ]
    }

    /// Latest configuration snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn changes_enabled(&self) -> bool {
        self.changes_enabled.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Option<PathBuf> {
        locked!(self.display).current.clone()
    }

    pub(crate) fn last_change(&self) -> Option<Instant> {
        locked!(self.display).last_change
    }

    /// Re-read the configuration file and apply it
    pub fn reload(&self) -> Result<()> {
        let config = match self.config_path {
            Some(ref path) => Config::load_from_path(path)?,
            None => Config::load()?,
        };
        self.reload_with(config);
        Ok(())
    }

    /// Replace the configuration snapshot and wake every background task
    pub fn reload_with(&self, config: Config) {
        log::info!("Loaded options:");
        log::info!("Change on start: {}", config.general.change_on_start);
        log::info!("Change enabled: {}", config.general.change_enabled);
        log::info!("Change interval: {}s", config.general.change_interval);
        log::info!("Download enabled: {}", config.general.download_enabled);
        log::info!("Download interval: {}s", config.general.download_interval);
        log::info!("Desired color: {:?}", config.desired_color());

        let sources = Sources::resolve(&config, &mut locked!(self.downloader_cache));
        locked!(self.history).set_limit(config.general.history_limit);
        self.changes_enabled
            .store(config.general.change_enabled, Ordering::Release);

        {
            // Prepared candidates were vetted against the old policy
            let mut prepared = locked!(self.prepared);
            *self
                .snapshot
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) =
                Arc::new(Snapshot { config, sources });
            prepared.reset();
        }
        self.sampler.invalidate();

        self.signal_all();
    }

    /// Stop all background tasks. They exit on their next wake-up.
    pub fn shutdown(&self) {
        log::info!("Shutting down rotation engine");
        self.running.store(false, Ordering::Release);
        self.scroll.cancel();
        self.signal_all();
    }

    pub fn pause(&self) {
        self.set_changes_enabled(false);
    }

    pub fn resume(&self) {
        self.set_changes_enabled(true);
    }

    pub fn toggle_pause(&self) {
        self.set_changes_enabled(!self.changes_enabled());
    }

    fn set_changes_enabled(&self, enabled: bool) {
        self.changes_enabled.store(enabled, Ordering::Release);
        log::info!(
            "Periodic changes {}",
            if enabled { "resumed" } else { "paused" }
        );
        self.change_event.set();
    }

    fn signal_all(&self) {
        self.change_event.set();
        self.prepare_event.set();
        self.download_event.set();
    }

    /// Show a fresh image. Blocking.
    ///
    /// Takes the next prepared image, or draws one directly when the buffer is
    /// empty. Returns `false` when no image could be found.
    pub fn trigger_change(self: &Arc<Self>) -> bool {
        let prepared = locked!(self.prepared).pop();
        if prepared.is_some() {
            self.prepare_event.set();
        }

        let image = prepared.or_else(|| {
            log::info!("No images yet in prepared buffer, using some random image");
            let snapshot = self.snapshot();
            self.sampler
                .sample(&snapshot.sources.enumerator, 1)
                .into_iter()
                .next()
        });

        let Some(image) = image else {
            log::info!("No images found");
            return false;
        };

        log::info!("Changing wallpaper to {}", image.display());
        locked!(self.history).advance(image.clone());
        self.request_apply(image);
        true
    }

    /// Go back to an older image. Returns `false` at the oldest entry.
    pub fn step_back(self: &Arc<Self>) -> bool {
        let image = locked!(self.history).step_back();
        match image {
            Some(image) => {
                self.request_apply(image);
                true
            }
            None => false,
        }
    }

    /// Go to a newer image, or show a fresh one at the newest entry. Blocking.
    pub fn step_forward(self: &Arc<Self>) -> bool {
        let image = locked!(self.history).step_forward();
        match image {
            Some(image) => {
                self.request_apply(image);
                true
            }
            None => self.trigger_change(),
        }
    }

    /// Scroll-wheel navigation; bursts collapse into one step
    pub fn scroll(self: &Arc<Self>, forward: bool) {
        let engine = self.clone();
        self.scroll.request(forward, move |forward| {
            if forward {
                engine.step_forward();
            } else {
                engine.step_back();
            }
        });
    }

    fn request_apply(self: &Arc<Self>, image: PathBuf) {
        let engine = self.clone();
        self.apply.request(image, move |image| engine.apply_now(&image));
    }

    /// Set `image` on the desktop, through a random filter if any are configured
    fn apply_now(&self, image: &Path) {
        log::info!("Setting wallpaper: {}", image.display());
        let snapshot = self.snapshot();

        let mut to_set = image.to_path_buf();
        if !snapshot.sources.filters.is_empty() {
            let index = rand::rng().random_range(0..snapshot.sources.filters.len());
            let spec = &snapshot.sources.filters[index];
            let output = snapshot.config.filter_output();
            match filters::apply_filter(image, spec, &output) {
                Ok(()) => to_set = output,
                Err(e) => log::warn!("Filter '{}' failed, using original: {:#}", spec, e),
            }
        }

        if let Err(e) = self.store.set_current(&to_set) {
            log::error!("Error while setting wallpaper: {:#}", e);
            return;
        }

        let mut display = locked!(self.display);
        display.current = Some(image.to_path_buf());
        display.last_change = Some(Instant::now());
        display.last_change_at = Some(Local::now());
    }

    /// Move the current image into the favorites folder. Blocking.
    pub fn move_to_favorites(&self) -> Result<()> {
        let file = self.current().context("No current wallpaper")?;
        let favorites = self.snapshot().config.favorites_folder();
        if file.starts_with(&favorites) {
            log::info!("{} is already a favorite", file.display());
            return Ok(());
        }

        let new_file = move_into(&file, &favorites)?;
        locked!(self.history).replace(&file, &new_file);
        locked!(self.prepared).remove(&file);
        {
            let mut display = locked!(self.display);
            if display.current.as_deref() == Some(file.as_path()) {
                display.current = Some(new_file.clone());
            }
        }

        // Keep the desktop pointing at an existing file
        if let Ok(Some(set)) = self.store.get_current() {
            if set == file {
                crate::log_and_continue!(self.store.set_current(&new_file), "update wallpaper path");
            }
        }
        Ok(())
    }

    /// Step away from the current image and move it to the desktop trash. Blocking.
    pub fn move_to_trash(self: &Arc<Self>) -> Result<()> {
        let file = self.current().context("No current wallpaper")?;
        self.step_away_from(&file);

        trash::delete(&file).with_context(|| format!("Could not trash {}", file.display()))?;
        let sidecar = sidecar_path(&file);
        if sidecar.exists() {
            crate::log_and_continue!(trash::delete(&sidecar), "trash sidecar");
        }
        log::info!("Moved {} to the trash", file.display());
        Ok(())
    }

    /// Move the cursor off `file`, then drop it from history and the buffer
    fn step_away_from(self: &Arc<Self>, file: &Path) {
        for _ in 0..MAX_TRASH_STEPS {
            let before = {
                let history = locked!(self.history);
                if history.at_cursor() != Some(file) {
                    break;
                }
                (history.position(), history.len())
            };
            self.step_forward();
            let after = {
                let history = locked!(self.history);
                (history.position(), history.len())
            };
            if before == after && locked!(self.history).at_cursor() == Some(file) {
                // Nothing else to show
                break;
            }
        }

        locked!(self.history).remove(file);
        locked!(self.prepared).remove(file);
    }

    pub fn status(&self) -> common::EngineStatus {
        let (current, last_change) = {
            let display = locked!(self.display);
            (display.current.clone(), display.last_change_at)
        };
        let (position, history_len, can_step_back) = {
            let history = locked!(self.history);
            (history.position(), history.len(), history.can_step_back())
        };
        let origin = current.as_deref().map(read_origin);

        common::EngineStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            current: current.map(|p| p.display().to_string()),
            origin_label: origin.as_ref().map(|o| o.label.clone()),
            origin_url: origin.and_then(|o| o.url),
            position,
            history_len,
            can_step_back,
            paused: !self.changes_enabled(),
            prepared: locked!(self.prepared).len(),
            image_count: self.sampler.image_count(),
            last_change: last_change.map(|t| t.to_rfc3339()),
        }
    }
}

/// Move `file` (and its sidecar, if any) into `folder`, returning the new path
fn move_into(file: &Path, folder: &Path) -> Result<PathBuf> {
    fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create {}", folder.display()))?;
    let name = file
        .file_name()
        .with_context(|| format!("Not a file: {}", file.display()))?;
    let target = folder.join(name);

    move_file(file, &target)
        .with_context(|| format!("Could not move {} to {}", file.display(), folder.display()))?;

    let sidecar = sidecar_path(file);
    if sidecar.exists() {
        crate::log_and_continue!(move_file(&sidecar, &sidecar_path(&target)), "move sidecar");
    }

    log::info!("Moved {} to {}", file.display(), folder.display());
    Ok(target)
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Different filesystem
    fs::copy(from, to)?;
    fs::remove_file(from)
}
