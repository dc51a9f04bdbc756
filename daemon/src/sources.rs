use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, expand_path};
use crate::downloader::{CommandDownloader, Downloader, identity_for};
use crate::enumerator::Enumerator;

/// Downloader instances kept across reloads, keyed by identity
pub type DownloaderCache = HashMap<String, Arc<dyn Downloader>>;

/// Sources resolved from one configuration snapshot
pub struct Sources {
    pub enumerator: Enumerator,
    pub downloaders: Vec<Arc<dyn Downloader>>,
    pub filters: Vec<String>,
}

impl Sources {
    /// Resolve the enabled sources of `config`.
    ///
    /// Downloaders that fail to initialize are logged and left out.
    pub fn resolve(config: &Config, cache: &mut DownloaderCache) -> Self {
        let download_folder = config.download_folder();
        let favorites_folder = config.favorites_folder();
        for folder in [&download_folder, &favorites_folder] {
            if let Err(e) = fs::create_dir_all(folder) {
                log::warn!("Could not create {}: {}", folder.display(), e);
            }
        }

        let images: Vec<PathBuf> = config
            .sources_of("image")
            .map(|s| expand_path(&s.location))
            .collect();

        let mut folders: Vec<PathBuf> = config
            .sources_of("folder")
            .map(|s| expand_path(&s.location))
            .collect();

        if config.sources_of("favorites").next().is_some() {
            folders.push(favorites_folder);
        }

        let mut downloaders: Vec<Arc<dyn Downloader>> = Vec::new();
        for source in config.sources_of("command") {
            let identity = identity_for(&source.location);
            if let Some(cached) = cache.get(&identity) {
                downloaders.push(cached.clone());
                continue;
            }

            match CommandDownloader::new(&source.location, &download_folder) {
                Ok(downloader) => {
                    let downloader: Arc<dyn Downloader> = Arc::new(downloader);
                    cache.insert(identity, downloader.clone());
                    downloaders.push(downloader);
                }
                Err(e) => {
                    log::error!(
                        "Could not create downloader for '{}': {:#}",
                        source.location,
                        e
                    );
                }
            }
        }

        for downloader in &downloaders {
            folders.push(downloader.target_folder().to_path_buf());
        }

        let filters = config.filter_specs();

        let enumerator = Enumerator::new(images, folders);
        log::info!("Images: {:?}", enumerator.images());
        log::info!("Folders: {:?}", enumerator.folders());
        log::info!("Total downloaders: {}", downloaders.len());
        log::info!("Filters: {:?}", filters);

        Self {
            enumerator,
            downloaders,
            filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEntry;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.general.download_folder = dir.join("dl").to_string_lossy().to_string();
        config.general.favorites_folder = dir.join("fav").to_string_lossy().to_string();
        config.source = vec![
            SourceEntry::new("folder", &dir.join("walls").to_string_lossy()),
            SourceEntry::new("image", &dir.join("one.jpg").to_string_lossy()),
            SourceEntry::new("favorites", ""),
            SourceEntry::new("command", "true"),
            SourceEntry::new("command", "   "),
        ];
        config
    }

    #[test]
    fn test_resolve_collects_folders_and_downloaders() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut cache = DownloaderCache::new();

        let sources = Sources::resolve(&config, &mut cache);

        assert!(dir.path().join("dl").is_dir());
        assert!(dir.path().join("fav").is_dir());
        assert_eq!(sources.enumerator.images(), &[dir.path().join("one.jpg")]);
        // walls, favorites, one downloader target; the blank command is dropped
        assert_eq!(sources.enumerator.folders().len(), 3);
        assert_eq!(sources.downloaders.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_reuses_cached_downloaders() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut cache = DownloaderCache::new();

        let first = Sources::resolve(&config, &mut cache);
        let second = Sources::resolve(&config, &mut cache);
        assert!(Arc::ptr_eq(&first.downloaders[0], &second.downloaders[0]));
    }

    #[test]
    fn test_disabled_sources_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        for source in &mut config.source {
            source.enabled = false;
        }
        let sources = Sources::resolve(&config, &mut DownloaderCache::new());
        assert!(sources.enumerator.folders().is_empty());
        assert!(sources.downloaders.is_empty());
    }
}
