use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;

/// Where the desktop keeps its current wallpaper.
pub trait WallpaperStore: Send + Sync {
    fn get_current(&self) -> Result<Option<PathBuf>>;
    fn set_current(&self, path: &Path) -> Result<()>;
}

/// Build the store selected in the configuration
pub fn from_config(config: &Config) -> Box<dyn WallpaperStore> {
    match config.general.store.as_str() {
        "file" => Box::new(StateFileStore::new(config.state_file())),
        _ => Box::new(GnomeStore::default()),
    }
}

const GNOME_SCHEMA: &str = "org.gnome.desktop.background";
const GNOME_KEY: &str = "picture-uri";
const GNOME_DARK_KEY: &str = "picture-uri-dark";

/// GNOME background through `gsettings`
#[derive(Debug)]
pub struct GnomeStore {
    /// Program plus any leading arguments, followed by `get`/`set` arguments
    command: Vec<String>,
}

impl Default for GnomeStore {
    fn default() -> Self {
        Self {
            command: vec!["gsettings".to_string()],
        }
    }
}

impl GnomeStore {
    fn gsettings(&self) -> Command {
        let mut command = Command::new(&self.command[0]);
        command.args(&self.command[1..]);
        command
    }

    fn set_key(&self, key: &str, uri: &str) -> Result<()> {
        let status = self
            .gsettings()
            .arg("set")
            .arg(GNOME_SCHEMA)
            .arg(key)
            .arg(uri)
            .status()
            .with_context(|| format!("run gsettings set ({key})"))?;
        if !status.success() {
            return Err(anyhow!("gsettings set failed ({key})"));
        }
        Ok(())
    }
}

impl WallpaperStore for GnomeStore {
    fn get_current(&self) -> Result<Option<PathBuf>> {
        let output = self
            .gsettings()
            .arg("get")
            .arg(GNOME_SCHEMA)
            .arg(GNOME_KEY)
            .output()
            .context("run gsettings get (picture-uri)")?;
        if !output.status.success() {
            return Err(anyhow!("gsettings get failed (picture-uri)"));
        }

        Ok(parse_gsettings_uri(&String::from_utf8_lossy(&output.stdout)))
    }

    fn set_current(&self, path: &Path) -> Result<()> {
        let uri = file_uri(path)?;
        self.set_key(GNOME_KEY, &uri)?;

        // Missing before GNOME 42
        crate::log_and_continue!(
            self.set_key(GNOME_DARK_KEY, &uri),
            "set the dark wallpaper variant"
        );
        Ok(())
    }
}

fn file_uri(path: &Path) -> Result<String> {
    let s = path
        .to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8"))?;
    Ok(format!("file://{s}"))
}

/// `'file:///a/b.jpg'` -> `/a/b.jpg`
fn parse_gsettings_uri(raw: &str) -> Option<PathBuf> {
    let value = raw.trim().trim_matches('\'');
    let path = value.strip_prefix("file://").unwrap_or(value);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Current wallpaper kept in a plain state file.
#[derive(Debug)]
pub struct StateFileStore {
    path: PathBuf,
}

impl StateFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl WallpaperStore for StateFileStore {
    fn get_current(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        let line = contents.trim();
        Ok((!line.is_empty()).then(|| PathBuf::from(line)))
    }

    fn set_current(&self, path: &Path) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", path.display()))
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }
}
