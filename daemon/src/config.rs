use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::color::Color;
use crate::validate_enum;

/// Main configuration structure
///
/// Treated as an immutable snapshot: the engine replaces it wholesale on reload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub color: ColorSettings,

    #[serde(default = "default_sources")]
    pub source: Vec<SourceEntry>,

    #[serde(default)]
    pub filter: Vec<FilterEntry>,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Desktop setting backend ("gnome" or "file")
    #[serde(default = "default_store")]
    pub store: String,

    /// File used by the "file" store
    #[serde(default = "default_state_file")]
    pub state_file: String,

    #[serde(default)]
    pub change_on_start: bool,

    #[serde(default = "default_true")]
    pub change_enabled: bool,

    /// Seconds between automatic changes
    #[serde(default = "default_change_interval")]
    pub change_interval: u64,

    #[serde(default)]
    pub download_enabled: bool,

    /// Seconds between background downloads
    #[serde(default = "default_download_interval")]
    pub download_interval: u64,

    #[serde(default = "default_download_folder")]
    pub download_folder: String,

    #[serde(default = "default_favorites_folder")]
    pub favorites_folder: String,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Where post-processed wallpapers are written
    #[serde(default = "default_filter_output")]
    pub filter_output: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            store: default_store(),
            state_file: default_state_file(),
            change_on_start: false,
            change_enabled: true,
            change_interval: default_change_interval(),
            download_enabled: false,
            download_interval: default_download_interval(),
            download_folder: default_download_folder(),
            favorites_folder: default_favorites_folder(),
            history_limit: default_history_limit(),
            filter_output: default_filter_output(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_store() -> String {
    "gnome".to_string()
}
fn default_state_file() -> String {
    "~/.config/rota/current".to_string()
}
fn default_true() -> bool {
    true
}
fn default_change_interval() -> u64 {
    300
} // 5 minutes
fn default_download_interval() -> u64 {
    600
}
fn default_download_folder() -> String {
    "~/.config/rota/Downloaded".to_string()
}
fn default_favorites_folder() -> String {
    "~/.config/rota/Favorites".to_string()
}
fn default_history_limit() -> usize {
    1000
}
fn default_filter_output() -> String {
    "~/.config/rota/wallpaper.jpg".to_string()
}

/// Desired-color policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Hex color, "RRGGBB" with optional leading '#'
    #[serde(default)]
    pub desired: Option<String>,

    #[serde(default = "default_min_tolerance")]
    pub min_tolerance: u32,

    #[serde(default = "default_max_tolerance")]
    pub max_tolerance: u32,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            desired: None,
            min_tolerance: default_min_tolerance(),
            max_tolerance: default_max_tolerance(),
        }
    }
}

fn default_min_tolerance() -> u32 {
    2
}
fn default_max_tolerance() -> u32 {
    6
}

/// Image source entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// One of "image", "folder", "favorites", "command"
    pub kind: String,

    /// Path, glob pattern or shell command depending on `kind`
    #[serde(default)]
    pub location: String,
}

impl SourceEntry {
    pub fn new(kind: &str, location: &str) -> Self {
        Self {
            enabled: true,
            kind: kind.to_string(),
            location: location.to_string(),
        }
    }
}

fn default_sources() -> Vec<SourceEntry> {
    vec![
        SourceEntry::new("folder", "~/Pictures"),
        SourceEntry::new("favorites", ""),
    ]
}

/// Post-processing filter entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whitespace separated operations, e.g. "grayscale blur:1.5"
    pub spec: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("rota");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        match self.general.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.general.log_level),
        }

        validate_enum!(self.general.store.as_str(), "gnome", "file")?;

        if self.general.change_interval == 0 {
            anyhow::bail!("change_interval must be at least 1 second");
        }
        if self.general.download_interval == 0 {
            anyhow::bail!("download_interval must be at least 1 second");
        }
        if self.general.history_limit == 0 {
            anyhow::bail!("history_limit must be at least 1");
        }

        if self.color.min_tolerance > self.color.max_tolerance {
            anyhow::bail!(
                "Invalid tolerance range: {}..{}",
                self.color.min_tolerance,
                self.color.max_tolerance
            );
        }
        if let Some(ref hex) = self.color.desired {
            if Color::from_hex(hex).is_none() {
                anyhow::bail!("Invalid desired color: {} (expected RRGGBB)", hex);
            }
        }

        for source in &self.source {
            validate_enum!(
                source.kind.as_str(),
                "image",
                "folder",
                "favorites",
                "command"
            )?;
        }

        Ok(())
    }

    /// Desired color, if the color policy is active
    pub fn desired_color(&self) -> Option<Color> {
        if !self.color.enabled {
            return None;
        }
        self.color.desired.as_deref().and_then(Color::from_hex)
    }

    /// Tolerance levels tried by the preparer, closest match first
    pub fn tolerance_levels(&self) -> RangeInclusive<u32> {
        self.color.min_tolerance..=self.color.max_tolerance
    }

    pub fn change_interval(&self) -> Duration {
        Duration::from_secs(self.general.change_interval)
    }

    pub fn download_interval(&self) -> Duration {
        Duration::from_secs(self.general.download_interval)
    }

    pub fn download_folder(&self) -> PathBuf {
        expand_path(&self.general.download_folder)
    }

    pub fn favorites_folder(&self) -> PathBuf {
        expand_path(&self.general.favorites_folder)
    }

    pub fn filter_output(&self) -> PathBuf {
        expand_path(&self.general.filter_output)
    }

    pub fn state_file(&self) -> PathBuf {
        expand_path(&self.general.state_file)
    }

    /// Enabled sources of the given kind
    pub fn sources_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a SourceEntry> + 'a {
        self.source
            .iter()
            .filter(move |s| s.enabled && s.kind == kind)
    }

    /// Enabled post-processing filter specs, in configuration order
    pub fn filter_specs(&self) -> Vec<String> {
        self.filter
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.spec.clone())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            color: ColorSettings::default(),
            source: default_sources(),
            filter: Vec::new(),
        }
    }
}

/// Expand a leading `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.change_interval, 300);
        assert_eq!(config.general.history_limit, 1000);
        assert_eq!(config.tolerance_levels(), 2..=6);
        assert!(config.desired_color().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r##"
[general]
change_interval = 60
download_enabled = true
store = "file"

[color]
enabled = true
desired = "#ff0000"

[[source]]
kind = "folder"
location = "/tmp/walls"

[[source]]
kind = "image"
location = "/tmp/one.jpg"
enabled = false

[[source]]
kind = "command"
location = "echo hi"

[[filter]]
spec = "grayscale"

[[filter]]
spec = "blur:2"
enabled = false
"##;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.change_interval(), Duration::from_secs(60));
        assert!(config.general.download_enabled);
        assert_eq!(config.desired_color(), Some(Color::new(255, 0, 0)));
        assert_eq!(config.sources_of("folder").count(), 1);
        assert_eq!(config.sources_of("image").count(), 0);
        assert_eq!(config.sources_of("command").count(), 1);
        assert_eq!(config.filter_specs(), vec!["grayscale".to_string()]);
    }

    #[test]
    fn test_desired_color_requires_enabled() {
        let mut config = Config::default();
        config.color.desired = Some("00ff00".to_string());
        assert!(config.desired_color().is_none());
        config.color.enabled = true;
        assert_eq!(config.desired_color(), Some(Color::new(0, 255, 0)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.general.store = "kde".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.change_interval = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.color.desired = Some("nothex".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.color.min_tolerance = 7;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.push(SourceEntry::new("flickr", "cats"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.general.change_interval, 300);
    }

    #[test]
    fn test_expand_path() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x"), home.join("x"));
        }
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
    }
}
